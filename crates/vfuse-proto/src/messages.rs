use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::fs_error::FsError;

/// Largest data payload a single read or write carries.
///
/// Leaves room under the frame limit for the rest of the body.
pub const MAX_DATA_CHUNK: usize = vfuse_frame::MAX_FRAME_SIZE - 64 * 1024;

/// Seconds and nanoseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timespec {
    pub sec: i64,
    pub nsec: u32,
}

impl Timespec {
    /// Convert back to a [`SystemTime`]; `None` if out of the platform's range.
    pub fn to_system_time(self) -> Option<SystemTime> {
        let nanos = Duration::from_nanos(u64::from(self.nsec));
        if self.sec >= 0 {
            UNIX_EPOCH
                .checked_add(Duration::from_secs(self.sec.unsigned_abs()))?
                .checked_add(nanos)
        } else {
            UNIX_EPOCH
                .checked_sub(Duration::from_secs(self.sec.unsigned_abs()))?
                .checked_add(nanos)
        }
    }
}

impl From<SystemTime> for Timespec {
    fn from(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(since) => Timespec {
                sec: since.as_secs() as i64,
                nsec: since.subsec_nanos(),
            },
            Err(err) => {
                let before = err.duration();
                let mut sec = -(before.as_secs() as i64);
                let mut nsec = before.subsec_nanos();
                if nsec > 0 {
                    sec -= 1;
                    nsec = 1_000_000_000 - nsec;
                }
                Timespec { sec, nsec }
            }
        }
    }
}

/// File attributes as reported to the VFS layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attr {
    pub size: u64,
    /// Permission bits plus Linux `S_IF*` type bits.
    pub mode: u32,
    pub nlink: u64,
    pub atime: Timespec,
    pub mtime: Timespec,
}

/// One directory listing entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub mode: u32,
}

/// Portable open flags. Kernel flag words differ between platforms, so the
/// initiator translates them before they reach the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenFlags {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    pub create: bool,
    pub truncate: bool,
    pub exclusive: bool,
}

impl OpenFlags {
    pub fn read_only() -> Self {
        Self {
            read: true,
            ..Self::default()
        }
    }

    pub fn read_write() -> Self {
        Self {
            read: true,
            write: true,
            ..Self::default()
        }
    }

    /// Whether opening with these flags can modify the volume.
    pub fn wants_write(&self) -> bool {
        self.write || self.append || self.create || self.truncate
    }
}

/// Attributes of `name`, or of the open `handle` when it is non-zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttrRequest {
    pub name: String,
    pub handle: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttrResponse {
    pub attr: Option<Attr>,
    pub err: Option<FsError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaddirRequest {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaddirResponse {
    pub entries: Vec<DirEntry>,
    pub err: Option<FsError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadlinkRequest {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadlinkResponse {
    pub target: String,
    pub err: Option<FsError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenRequest {
    pub name: String,
    pub flags: OpenFlags,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenResponse {
    pub handle: u64,
    pub err: Option<FsError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRequest {
    pub name: String,
    pub flags: OpenFlags,
    pub mode: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateResponse {
    pub handle: u64,
    pub err: Option<FsError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadRequest {
    pub handle: u64,
    pub offset: u64,
    pub size: u32,
}

/// Empty `data` with no error means end of file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadResponse {
    pub data: Vec<u8>,
    pub err: Option<FsError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteRequest {
    pub handle: u64,
    pub offset: u64,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResponse {
    pub written: u32,
    pub err: Option<FsError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChmodRequest {
    pub name: String,
    pub handle: u64,
    pub mode: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChmodResponse {
    pub err: Option<FsError>,
}

/// Ownership change. `None` leaves that id unchanged. Names are only
/// meaningful when both peers share a user database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChownRequest {
    pub name: String,
    pub handle: u64,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub user: Option<String>,
    pub group: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChownResponse {
    pub err: Option<FsError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruncateRequest {
    pub name: String,
    pub handle: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruncateResponse {
    pub err: Option<FsError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtimeRequest {
    pub name: String,
    pub handle: u64,
    pub atime: Option<Timespec>,
    pub mtime: Option<Timespec>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtimeResponse {
    pub err: Option<FsError>,
}

/// Create `name` as a hard link to the existing `target`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRequest {
    pub name: String,
    pub target: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkResponse {
    pub err: Option<FsError>,
}

/// Create `name` as a symlink whose content is `value` (stored verbatim).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymlinkRequest {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymlinkResponse {
    pub err: Option<FsError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MkdirRequest {
    pub name: String,
    pub mode: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MkdirResponse {
    pub err: Option<FsError>,
}

/// Move `name` to `target`, replacing `target` if it exists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameRequest {
    pub name: String,
    pub target: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameResponse {
    pub err: Option<FsError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RmdirRequest {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RmdirResponse {
    pub err: Option<FsError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlinkRequest {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlinkResponse {
    pub err: Option<FsError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MknodRequest {
    pub name: String,
    pub mode: u32,
    pub dev: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MknodResponse {
    pub err: Option<FsError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseRequest {
    pub handle: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseResponse {
    pub err: Option<FsError>,
}

/// A request schema with a known response schema.
pub trait Rpc: Into<Request> {
    type Response;

    /// Kind of this request.
    const KIND: MessageKind;

    /// Extract the matching response, handing back anything else unchanged.
    fn from_response(response: Response) -> std::result::Result<Self::Response, Response>;
}

/// Any decoded body.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request(Request),
    Response(Response),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Request(request) => request.kind(),
            Message::Response(response) => response.kind(),
        }
    }

    pub(crate) fn to_body(&self) -> postcard::Result<Vec<u8>> {
        match self {
            Message::Request(request) => request.to_body(),
            Message::Response(response) => response.to_body(),
        }
    }
}

impl From<Request> for Message {
    fn from(request: Request) -> Self {
        Message::Request(request)
    }
}

impl From<Response> for Message {
    fn from(response: Response) -> Self {
        Message::Response(response)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

macro_rules! protocol {
    ($( $variant:ident($req:ident => $res:ident), )+) => {
        /// Every concrete schema this build knows.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum MessageKind {
            $( $req, $res, )+
        }

        impl MessageKind {
            /// Schema type name.
            pub fn name(self) -> &'static str {
                match self {
                    $(
                        MessageKind::$req => stringify!($req),
                        MessageKind::$res => stringify!($res),
                    )+
                }
            }

            pub fn is_request(self) -> bool {
                match self {
                    $(
                        MessageKind::$req => true,
                        MessageKind::$res => false,
                    )+
                }
            }
        }

        /// Request bodies, one variant per operation.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Request {
            $( $variant($req), )+
        }

        /// Response bodies, one variant per operation.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Response {
            $( $variant($res), )+
        }

        impl Request {
            pub fn kind(&self) -> MessageKind {
                match self {
                    $( Request::$variant(_) => MessageKind::$req, )+
                }
            }

            /// Kind of the response this request expects.
            pub fn response_kind(&self) -> MessageKind {
                match self {
                    $( Request::$variant(_) => MessageKind::$res, )+
                }
            }

            fn to_body(&self) -> postcard::Result<Vec<u8>> {
                match self {
                    $( Request::$variant(body) => postcard::to_stdvec(body), )+
                }
            }
        }

        impl Response {
            pub fn kind(&self) -> MessageKind {
                match self {
                    $( Response::$variant(_) => MessageKind::$res, )+
                }
            }

            /// The structured error this response carries, if any.
            pub fn error(&self) -> Option<&FsError> {
                match self {
                    $( Response::$variant(body) => body.err.as_ref(), )+
                }
            }

            fn to_body(&self) -> postcard::Result<Vec<u8>> {
                match self {
                    $( Response::$variant(body) => postcard::to_stdvec(body), )+
                }
            }
        }

        impl Message {
            /// Decode `body` as the schema `kind` names.
            pub(crate) fn from_body(kind: MessageKind, body: &[u8]) -> postcard::Result<Message> {
                Ok(match kind {
                    $(
                        MessageKind::$req => {
                            Message::Request(Request::$variant(postcard::from_bytes(body)?))
                        }
                        MessageKind::$res => {
                            Message::Response(Response::$variant(postcard::from_bytes(body)?))
                        }
                    )+
                })
            }

            /// A default-valued message of `kind`.
            pub fn empty(kind: MessageKind) -> Message {
                match kind {
                    $(
                        MessageKind::$req => Message::Request(Request::$variant($req::default())),
                        MessageKind::$res => Message::Response(Response::$variant($res::default())),
                    )+
                }
            }
        }

        $(
            impl From<$req> for Request {
                fn from(body: $req) -> Self {
                    Request::$variant(body)
                }
            }

            impl From<$res> for Response {
                fn from(body: $res) -> Self {
                    Response::$variant(body)
                }
            }

            impl Rpc for $req {
                type Response = $res;
                const KIND: MessageKind = MessageKind::$req;

                fn from_response(response: Response) -> std::result::Result<$res, Response> {
                    match response {
                        Response::$variant(body) => Ok(body),
                        other => Err(other),
                    }
                }
            }
        )+

        /// Request/response pairs in wire registration order.
        pub(crate) const STANDARD_PAIRS: &[(MessageKind, MessageKind)] = &[
            $( (MessageKind::$req, MessageKind::$res), )+
        ];
    };
}

// Order is the wire contract. Append only.
protocol! {
    Attr(AttrRequest => AttrResponse),
    Readdir(ReaddirRequest => ReaddirResponse),
    Readlink(ReadlinkRequest => ReadlinkResponse),
    Open(OpenRequest => OpenResponse),
    Create(CreateRequest => CreateResponse),
    Read(ReadRequest => ReadResponse),
    Write(WriteRequest => WriteResponse),
    Chmod(ChmodRequest => ChmodResponse),
    Chown(ChownRequest => ChownResponse),
    Truncate(TruncateRequest => TruncateResponse),
    Utime(UtimeRequest => UtimeResponse),
    Link(LinkRequest => LinkResponse),
    Symlink(SymlinkRequest => SymlinkResponse),
    Mkdir(MkdirRequest => MkdirResponse),
    Rename(RenameRequest => RenameResponse),
    Rmdir(RmdirRequest => RmdirResponse),
    Unlink(UnlinkRequest => UnlinkResponse),
    Mknod(MknodRequest => MknodResponse),
    Close(CloseRequest => CloseResponse),
}
