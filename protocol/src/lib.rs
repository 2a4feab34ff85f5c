//! tracker-protocol: wire codec and data model for the source channel.
//!
//! Pure parsing and types — no I/O, no async runtime. The channel server
//! in the `tracker` crate owns transport and dispatch; this crate owns the
//! frame formats and the shapes that cross them.

pub mod entities;
pub mod frame;
pub mod model;
pub mod text;
pub mod version;

pub use entities::decode_html_entities;
pub use frame::{decode_binary_frame, encode_binary_frame, BinaryFrame, FrameError};
pub use model::{
    AthleteKey, AthleteRecord, AttemptFields, Database, FopState, LiftType, PlatformId,
    TranslationMap,
};
pub use text::{parse_text_frame, parsed_version, InboundText, ReplyEnvelope, TextFrame, TextFrameError};
pub use version::Version;

/// Known binary frame type names (spec §6).
pub mod binary_types {
    pub const FLAGS_ZIP: &str = "flags_zip";
    /// Legacy alias, treated identically to `flags_zip`.
    pub const FLAGS_LEGACY: &str = "flags";
    pub const PICTURES: &str = "pictures";
    pub const STYLES: &str = "styles";
    pub const TRANSLATIONS_ZIP: &str = "translations_zip";
    pub const DATABASE_ZIP: &str = "database_zip";
}

/// Canonical names used in `missing` preconditions lists and cache
/// invalidation triggers (spec §4.3, §4.5).
pub mod preconditions {
    pub const DATABASE: &str = "database";
    pub const TRANSLATIONS: &str = "translations";
    pub const FLAGS: &str = "flags";
}
