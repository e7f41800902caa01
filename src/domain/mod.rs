pub mod outcome;
pub mod push;

pub use outcome::{Classification, DispatchOutcome, LogPushEntry, PushStatus};
pub use push::{Alert, CredentialOverrides, Platform, PushRequest, Sound, SoundField};
