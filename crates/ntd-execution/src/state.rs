use std::fmt;

use ntd_ndef::CodecError;
use ntd_profile::TagKind;
use ntd_schemas::Uid;

// ---------------------------------------------------------------------------
// TagState
// ---------------------------------------------------------------------------

/// Where one tag is in its write/lock lifecycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TagState {
    Idle,
    /// Waiting for the planned tag to be presented.
    Detecting,
    /// Identifying the tag and checking it is safe to write.
    Formatting,
    Writing,
    /// Reading back and decoding what was written.
    Verifying,
    /// Waiting for the operator to confirm the lock.
    LockPending,
    Locking,
    VerifyingLock,
    /// Record verified on the tag. **Terminal.**
    Done {
        locked: bool,
        detail: Option<String>,
    },
    /// **Terminal.**
    Failed(FailReason),
    /// **Terminal.**
    Skipped(String),
}

impl TagState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TagState::Done { .. } | TagState::Failed(_) | TagState::Skipped(_)
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            TagState::Idle => "Idle",
            TagState::Detecting => "Detecting",
            TagState::Formatting => "Formatting",
            TagState::Writing => "Writing",
            TagState::Verifying => "Verifying",
            TagState::LockPending => "LockPending",
            TagState::Locking => "Locking",
            TagState::VerifyingLock => "VerifyingLock",
            TagState::Done { .. } => "Done",
            TagState::Failed(_) => "Failed",
            TagState::Skipped(_) => "Skipped",
        }
    }
}

impl fmt::Display for TagState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagState::Failed(reason) => write!(f, "Failed({reason})"),
            TagState::Skipped(reason) => write!(f, "Skipped({reason})"),
            other => f.write_str(other.name()),
        }
    }
}

// ---------------------------------------------------------------------------
// Fault: recoverable, goes to the operator
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fault {
    TagRemoved,
    DetectTimeout,
    /// A tag other than the planned one was presented.
    UnexpectedTag { expected: Uid, found: Uid },
    ReaderIo(String),
    WriteIoError(String),
    VerifyMismatch(String),
    LockIoError(String),
}

impl Fault {
    pub fn code(&self) -> &'static str {
        match self {
            Fault::TagRemoved => "TAG_REMOVED",
            Fault::DetectTimeout => "DETECT_TIMEOUT",
            Fault::UnexpectedTag { .. } => "UNEXPECTED_TAG",
            Fault::ReaderIo(_) => "READER_IO",
            Fault::WriteIoError(_) => "WRITE_IO_ERROR",
            Fault::VerifyMismatch(_) => "VERIFY_MISMATCH",
            Fault::LockIoError(_) => "LOCK_IO_ERROR",
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::TagRemoved => write!(f, "tag removed"),
            Fault::DetectTimeout => write!(f, "no tag presented before timeout"),
            Fault::UnexpectedTag { expected, found } => {
                write!(f, "wrong tag: expected {expected}, found {found}")
            }
            Fault::ReaderIo(msg) => write!(f, "reader error: {msg}"),
            Fault::WriteIoError(msg) => write!(f, "write failed: {msg}"),
            Fault::VerifyMismatch(msg) => write!(f, "verification failed: {msg}"),
            Fault::LockIoError(msg) => write!(f, "lock failed: {msg}"),
        }
    }
}

// ---------------------------------------------------------------------------
// FailReason: terminal for the tag, never retried
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailReason {
    /// Tag reports a different family than it did at scan time.
    ProfileMismatch { expected: TagKind, found: TagKind },
    UnsupportedTag(String),
    TagAlreadyLocked,
    /// Tag carries a different record and overwriting was not forced.
    ExistingRecord(String),
    Encode(CodecError),
    LockVerificationFailed { expected: String, found: String },
    RetryLimit { attempts: u32 },
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailReason::ProfileMismatch { expected, found } => write!(
                f,
                "profile mismatch: scanned as {}, now reports {}",
                expected.as_str(),
                found.as_str()
            ),
            FailReason::UnsupportedTag(msg) => write!(f, "{msg}"),
            FailReason::TagAlreadyLocked => write!(f, "tag is already locked"),
            FailReason::ExistingRecord(existing) => {
                write!(f, "tag already holds a different record ({existing}); use --force")
            }
            FailReason::Encode(e) => write!(f, "{e}"),
            FailReason::LockVerificationFailed { expected, found } => write!(
                f,
                "lock verification failed: expected lock bytes {expected}, read {found}"
            ),
            FailReason::RetryLimit { attempts } => {
                write!(f, "gave up after {attempts} attempts")
            }
        }
    }
}
