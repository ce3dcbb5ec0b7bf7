use std::ffi::CString;
use std::fs::{self, DirBuilder, FileTimes, OpenOptions, Permissions};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{DirBuilderExt, FileExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use tracing::info;
use vfuse_peer::Dispatcher;
use vfuse_proto::{
    Attr, AttrRequest, AttrResponse, ChmodRequest, ChmodResponse, ChownRequest, ChownResponse,
    CloseRequest, CloseResponse, CreateRequest, CreateResponse, DirEntry, FsError, LinkRequest,
    LinkResponse, MkdirRequest, MkdirResponse, MknodRequest, MknodResponse, OpenFlags, OpenRequest,
    OpenResponse, ReadRequest, ReadResponse, ReaddirRequest, ReaddirResponse, ReadlinkRequest,
    ReadlinkResponse, RenameRequest, RenameResponse, Request, Response, RmdirRequest,
    RmdirResponse, SymlinkRequest, SymlinkResponse, Timespec, TruncateRequest, TruncateResponse,
    UnlinkRequest, UnlinkResponse, UtimeRequest, UtimeResponse, WriteRequest, WriteResponse,
    MAX_DATA_CHUNK,
};

use crate::error::{Result, VolumeError};
use crate::handles::HandleTable;
use crate::mode::{attr_of, mode_of};
use crate::path::resolve;

/// Outcome of one filesystem operation.
pub type FsResult<T> = std::result::Result<T, FsError>;

const CREATE_MODE_BITS: u32 = 0o7777;

/// Where a volume lives and whether it may be modified.
#[derive(Debug, Clone)]
pub struct VolumeConfig {
    pub root: PathBuf,
    pub writable: bool,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            writable: true,
        }
    }
}

/// A shared directory tree and the files opened in it over one connection.
#[derive(Debug)]
pub struct Volume {
    root: PathBuf,
    writable: bool,
    handles: HandleTable,
}

impl Volume {
    /// Open the volume described by `config`.
    pub fn new(config: VolumeConfig) -> Result<Self> {
        let root = fs::canonicalize(&config.root).map_err(|source| VolumeError::Root {
            path: config.root.clone(),
            source,
        })?;
        if !root.is_dir() {
            return Err(VolumeError::NotADirectory(root));
        }
        info!(root = %root.display(), writable = config.writable, "volume ready");
        Ok(Self {
            root,
            writable: config.writable,
            handles: HandleTable::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Number of open handles.
    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }

    fn require_writable(&self) -> FsResult<()> {
        if self.writable {
            Ok(())
        } else {
            Err(FsError::ReadOnly)
        }
    }

    fn path(&self, name: &str) -> FsResult<PathBuf> {
        resolve(&self.root, name)
    }

    pub fn attr(&self, req: &AttrRequest) -> FsResult<Attr> {
        let metadata = if req.handle != 0 {
            self.handles.get(req.handle)?.metadata()?
        } else {
            fs::symlink_metadata(self.path(&req.name)?)?
        };
        Ok(attr_of(&metadata))
    }

    pub fn readdir(&self, req: &ReaddirRequest) -> FsResult<Vec<DirEntry>> {
        let path = self.path(&req.name)?;
        let mut entries = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                mode: mode_of(&metadata),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    pub fn readlink(&self, req: &ReadlinkRequest) -> FsResult<String> {
        let target = fs::read_link(self.path(&req.name)?)?;
        Ok(target.to_string_lossy().into_owned())
    }

    pub fn open(&self, req: &OpenRequest) -> FsResult<u64> {
        if req.flags.wants_write() {
            self.require_writable()?;
        }
        let path = self.path(&req.name)?;
        let file = open_options(&req.flags).open(path)?;
        Ok(self.handles.insert(file))
    }

    pub fn create(&self, req: &CreateRequest) -> FsResult<u64> {
        self.require_writable()?;
        let path = self.path(&req.name)?;
        let mut options = open_options(&req.flags);
        if !req.flags.append {
            options.write(true);
        }
        options
            .create(true)
            .mode(req.mode & CREATE_MODE_BITS);
        let file = options.open(path)?;
        Ok(self.handles.insert(file))
    }

    /// Read up to `size` bytes at `offset`; fewer only at end of file.
    pub fn read(&self, req: &ReadRequest) -> FsResult<Vec<u8>> {
        let file = self.handles.get(req.handle)?;
        let want = (req.size as usize).min(MAX_DATA_CHUNK);
        let mut buf = vec![0u8; want];
        let mut filled = 0usize;
        while filled < want {
            match file.read_at(&mut buf[filled..], req.offset + filled as u64) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
        buf.truncate(filled);
        Ok(buf)
    }

    pub fn write(&self, req: &WriteRequest) -> FsResult<u32> {
        self.require_writable()?;
        let file = self.handles.get(req.handle)?;
        file.write_all_at(&req.data, req.offset)?;
        Ok(req.data.len() as u32)
    }

    pub fn chmod(&self, req: &ChmodRequest) -> FsResult<()> {
        self.require_writable()?;
        let permissions = Permissions::from_mode(req.mode & CREATE_MODE_BITS);
        if req.handle != 0 {
            self.handles.get(req.handle)?.set_permissions(permissions)?;
        } else {
            fs::set_permissions(self.path(&req.name)?, permissions)?;
        }
        Ok(())
    }

    pub fn chown(&self, req: &ChownRequest) -> FsResult<()> {
        self.require_writable()?;
        if req.user.is_some() || req.group.is_some() {
            return Err(FsError::Other(
                "ownership by user or group name is not supported".to_string(),
            ));
        }
        if req.handle != 0 {
            let file = self.handles.get(req.handle)?;
            std::os::unix::fs::fchown(&*file, req.uid, req.gid)?;
        } else {
            std::os::unix::fs::lchown(self.path(&req.name)?, req.uid, req.gid)?;
        }
        Ok(())
    }

    pub fn truncate(&self, req: &TruncateRequest) -> FsResult<()> {
        self.require_writable()?;
        if req.handle != 0 {
            self.handles.get(req.handle)?.set_len(req.size)?;
        } else {
            // By path so a FIFO is never opened.
            let c_path = c_path(&self.path(&req.name)?)?;
            let size = libc::off_t::try_from(req.size)
                .map_err(|_| FsError::Other(format!("size {} out of range", req.size)))?;
            // SAFETY: `c_path` is a valid NUL-terminated string that outlives the call.
            if unsafe { libc::truncate(c_path.as_ptr(), size) } != 0 {
                return Err(io::Error::last_os_error().into());
            }
        }
        Ok(())
    }

    /// A missing time is left unchanged.
    pub fn utime(&self, req: &UtimeRequest) -> FsResult<()> {
        self.require_writable()?;
        if req.handle != 0 {
            let mut times = FileTimes::new();
            if let Some(atime) = req.atime {
                times = times.set_accessed(system_time(atime)?);
            }
            if let Some(mtime) = req.mtime {
                times = times.set_modified(system_time(mtime)?);
            }
            self.handles.get(req.handle)?.set_times(times)?;
            return Ok(());
        }

        let c_path = c_path(&self.path(&req.name)?)?;
        let times = [utime_spec(req.atime)?, utime_spec(req.mtime)?];
        // SAFETY: `c_path` is NUL-terminated and `times` holds the two entries
        // utimensat reads; both outlive the call.
        let rc = unsafe { libc::utimensat(libc::AT_FDCWD, c_path.as_ptr(), times.as_ptr(), 0) };
        if rc != 0 {
            return Err(io::Error::last_os_error().into());
        }
        Ok(())
    }

    pub fn link(&self, req: &LinkRequest) -> FsResult<()> {
        self.require_writable()?;
        let link = self.path(&req.name)?;
        let existing = self.path(&req.target)?;
        fs::hard_link(existing, link)?;
        Ok(())
    }

    /// The link's content is stored verbatim; only its location is checked.
    pub fn symlink(&self, req: &SymlinkRequest) -> FsResult<()> {
        self.require_writable()?;
        std::os::unix::fs::symlink(&req.value, self.path(&req.name)?)?;
        Ok(())
    }

    pub fn mkdir(&self, req: &MkdirRequest) -> FsResult<()> {
        self.require_writable()?;
        DirBuilder::new()
            .mode(req.mode & CREATE_MODE_BITS)
            .create(self.path(&req.name)?)?;
        Ok(())
    }

    pub fn rename(&self, req: &RenameRequest) -> FsResult<()> {
        self.require_writable()?;
        let from = self.path(&req.name)?;
        let to = self.path(&req.target)?;
        fs::rename(from, to)?;
        Ok(())
    }

    pub fn rmdir(&self, req: &RmdirRequest) -> FsResult<()> {
        self.require_writable()?;
        let path = self.path(&req.name)?;
        if !fs::symlink_metadata(&path)?.is_dir() {
            return Err(FsError::NotDir);
        }
        fs::remove_dir(path)?;
        Ok(())
    }

    pub fn unlink(&self, req: &UnlinkRequest) -> FsResult<()> {
        self.require_writable()?;
        fs::remove_file(self.path(&req.name)?)?;
        Ok(())
    }

    pub fn mknod(&self, req: &MknodRequest) -> FsResult<()> {
        self.require_writable()?;
        let c_path = c_path(&self.path(&req.name)?)?;
        // SAFETY: `c_path` is a valid NUL-terminated string that outlives the call.
        let rc = unsafe {
            libc::mknod(
                c_path.as_ptr(),
                req.mode as libc::mode_t,
                req.dev as libc::dev_t,
            )
        };
        if rc != 0 {
            return Err(io::Error::last_os_error().into());
        }
        Ok(())
    }

    pub fn close(&self, req: &CloseRequest) -> FsResult<()> {
        self.handles.remove(req.handle)
    }
}

impl Dispatcher for Volume {
    fn dispatch(&self, request: Request) -> Response {
        match request {
            Request::Attr(req) => match self.attr(&req) {
                Ok(attr) => AttrResponse {
                    attr: Some(attr),
                    err: None,
                },
                Err(err) => AttrResponse {
                    attr: None,
                    err: Some(err),
                },
            }
            .into(),
            Request::Readdir(req) => match self.readdir(&req) {
                Ok(entries) => ReaddirResponse { entries, err: None },
                Err(err) => ReaddirResponse {
                    entries: Vec::new(),
                    err: Some(err),
                },
            }
            .into(),
            Request::Readlink(req) => match self.readlink(&req) {
                Ok(target) => ReadlinkResponse { target, err: None },
                Err(err) => ReadlinkResponse {
                    target: String::new(),
                    err: Some(err),
                },
            }
            .into(),
            Request::Open(req) => match self.open(&req) {
                Ok(handle) => OpenResponse { handle, err: None },
                Err(err) => OpenResponse {
                    handle: 0,
                    err: Some(err),
                },
            }
            .into(),
            Request::Create(req) => match self.create(&req) {
                Ok(handle) => CreateResponse { handle, err: None },
                Err(err) => CreateResponse {
                    handle: 0,
                    err: Some(err),
                },
            }
            .into(),
            Request::Read(req) => match self.read(&req) {
                Ok(data) => ReadResponse { data, err: None },
                Err(err) => ReadResponse {
                    data: Vec::new(),
                    err: Some(err),
                },
            }
            .into(),
            Request::Write(req) => match self.write(&req) {
                Ok(written) => WriteResponse { written, err: None },
                Err(err) => WriteResponse {
                    written: 0,
                    err: Some(err),
                },
            }
            .into(),
            Request::Chmod(req) => ChmodResponse {
                err: self.chmod(&req).err(),
            }
            .into(),
            Request::Chown(req) => ChownResponse {
                err: self.chown(&req).err(),
            }
            .into(),
            Request::Truncate(req) => TruncateResponse {
                err: self.truncate(&req).err(),
            }
            .into(),
            Request::Utime(req) => UtimeResponse {
                err: self.utime(&req).err(),
            }
            .into(),
            Request::Link(req) => LinkResponse {
                err: self.link(&req).err(),
            }
            .into(),
            Request::Symlink(req) => SymlinkResponse {
                err: self.symlink(&req).err(),
            }
            .into(),
            Request::Mkdir(req) => MkdirResponse {
                err: self.mkdir(&req).err(),
            }
            .into(),
            Request::Rename(req) => RenameResponse {
                err: self.rename(&req).err(),
            }
            .into(),
            Request::Rmdir(req) => RmdirResponse {
                err: self.rmdir(&req).err(),
            }
            .into(),
            Request::Unlink(req) => UnlinkResponse {
                err: self.unlink(&req).err(),
            }
            .into(),
            Request::Mknod(req) => MknodResponse {
                err: self.mknod(&req).err(),
            }
            .into(),
            Request::Close(req) => CloseResponse {
                err: self.close(&req).err(),
            }
            .into(),
        }
    }
}

fn open_options(flags: &OpenFlags) -> OpenOptions {
    let mut options = OpenOptions::new();
    options
        .read(flags.read || !(flags.write || flags.append))
        .write(flags.write)
        .append(flags.append)
        .truncate(flags.truncate)
        .create(flags.create)
        .create_new(flags.exclusive);
    options
}

fn system_time(ts: Timespec) -> FsResult<std::time::SystemTime> {
    ts.to_system_time()
        .ok_or_else(|| FsError::Other(format!("timestamp {}.{:09} out of range", ts.sec, ts.nsec)))
}

fn utime_spec(ts: Option<Timespec>) -> FsResult<libc::timespec> {
    let Some(ts) = ts else {
        return Ok(libc::timespec {
            tv_sec: 0,
            tv_nsec: libc::UTIME_OMIT,
        });
    };
    let out_of_range = || FsError::Other(format!("timestamp {}.{:09} out of range", ts.sec, ts.nsec));
    Ok(libc::timespec {
        tv_sec: libc::time_t::try_from(ts.sec).map_err(|_| out_of_range())?,
        tv_nsec: ts.nsec.try_into().map_err(|_| out_of_range())?,
    })
}

fn c_path(path: &Path) -> FsResult<CString> {
    CString::new(path.as_os_str().as_bytes()).map_err(|_| FsError::BadPath)
}
