use anvil_refs::{RefKind, RefTarget, RefUpdate};
use anvil_types::OperationId;
use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: u32 = 1;

/// Default cap on a single frame (tag byte plus payload).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Stable error codes carried by `Error` frames.
pub mod codes {
    pub const PROTOCOL: u32 = 1;
    pub const INTEGRITY: u32 = 2;
    pub const DANGLING_PARENT: u32 = 3;
    /// The only retryable code.
    pub const RACE_EXCEEDED: u32 = 4;
    pub const NOT_FOUND: u32 = 5;
    pub const UNAUTHORIZED: u32 = 6;
    pub const REJECTED: u32 = 7;
    pub const STORAGE: u32 = 8;
    pub const INTERNAL: u32 = 9;
}

/// All message types in the Anvil sync protocol.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnvilMessage {
    /// First frame on a raw TCP connection: which repository, and who.
    Connect {
        repository: String,
        token: Option<String>,
    },
    Hello {
        version: u32,
        capabilities: Vec<String>,
    },
    /// `have_ops` advertises operations the client holds (heads first, then
    /// recent ancestors) so the server can find shared history.
    FetchRequest {
        have_ops: Vec<OperationId>,
        want_refs: Vec<String>,
        depth: Option<u32>,
    },
    FetchResponse {
        ops_to_send: Vec<OperationId>,
        object_count: u32,
    },
    /// `heads` are the client heads to install; `have_ops` is advertised as
    /// in `FetchRequest`.
    PushRequest {
        heads: Vec<OperationId>,
        have_ops: Vec<OperationId>,
        updates: Vec<RefUpdate>,
    },
    PushNegotiate {
        common_op: Option<OperationId>,
        need_objects: bool,
    },
    /// One chunk of a pack stream.
    PackData { chunk: Vec<u8> },
    PackEnd {
        object_count: u32,
        checksum: [u8; 32],
    },
    PushResult {
        status: PushStatus,
        new_op_head: Option<OperationId>,
        ref_results: Vec<RefResult>,
    },
    Error { code: u32, message: String },
}

/// Overall outcome of a push.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PushStatus {
    /// Installed with no conflicted references.
    Ok,
    /// Installed, but the merge left one or more references conflicted.
    Conflict,
    /// Nothing installed.
    Rejected,
}

impl PushStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PushStatus::Ok => "ok",
            PushStatus::Conflict => "conflict",
            PushStatus::Rejected => "rejected",
        }
    }
}

/// Where one requested reference update ended up after the push.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefResult {
    /// The reference now points where the client asked.
    Ok { kind: RefKind, name: String },
    /// The reference was merged with a concurrent move and is conflicted.
    Conflict {
        kind: RefKind,
        name: String,
        target: RefTarget,
    },
    /// A concurrent update won; the reference points elsewhere.
    Stale {
        kind: RefKind,
        name: String,
        current: Option<RefTarget>,
    },
    Rejected {
        kind: RefKind,
        name: String,
        reason: String,
    },
}

impl RefResult {
    pub fn name(&self) -> &str {
        match self {
            RefResult::Ok { name, .. }
            | RefResult::Conflict { name, .. }
            | RefResult::Stale { name, .. }
            | RefResult::Rejected { name, .. } => name,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, RefResult::Ok { .. })
    }
}

impl AnvilMessage {
    pub fn type_tag(&self) -> u8 {
        match self {
            Self::Connect { .. } => 1,
            Self::Hello { .. } => 2,
            Self::FetchRequest { .. } => 3,
            Self::FetchResponse { .. } => 4,
            Self::PushRequest { .. } => 5,
            Self::PushNegotiate { .. } => 6,
            Self::PackData { .. } => 7,
            Self::PackEnd { .. } => 8,
            Self::PushResult { .. } => 9,
            Self::Error { .. } => 255,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "Connect",
            Self::Hello { .. } => "Hello",
            Self::FetchRequest { .. } => "FetchRequest",
            Self::FetchResponse { .. } => "FetchResponse",
            Self::PushRequest { .. } => "PushRequest",
            Self::PushNegotiate { .. } => "PushNegotiate",
            Self::PackData { .. } => "PackData",
            Self::PackEnd { .. } => "PackEnd",
            Self::PushResult { .. } => "PushResult",
            Self::Error { .. } => "Error",
        }
    }

    /// Whether `tag` names a known message type.
    pub fn is_known_tag(tag: u8) -> bool {
        matches!(tag, 1..=9 | 255)
    }

    /// Build a local `Hello` advertising this build's capabilities.
    pub fn hello() -> Self {
        Self::Hello {
            version: PROTOCOL_VERSION,
            capabilities: crate::capabilities::local_capabilities(),
        }
    }
}
