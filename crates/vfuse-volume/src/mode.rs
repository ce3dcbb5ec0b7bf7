use std::fs::{FileType, Metadata};
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};

use vfuse_proto::{Attr, Timespec};

// Linux type bits; the initiator is always Linux whatever the responder runs.
pub const S_IFIFO: u32 = 0o010000;
pub const S_IFCHR: u32 = 0o020000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFBLK: u32 = 0o060000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFLNK: u32 = 0o120000;
pub const S_IFSOCK: u32 = 0o140000;

const PERMISSION_BITS: u32 = 0o777;

/// Linux `S_IF*` bits for a file type.
pub fn type_bits(file_type: FileType) -> u32 {
    if file_type.is_dir() {
        S_IFDIR
    } else if file_type.is_file() {
        S_IFREG
    } else if file_type.is_symlink() {
        S_IFLNK
    } else if file_type.is_fifo() {
        S_IFIFO
    } else if file_type.is_char_device() {
        S_IFCHR
    } else if file_type.is_block_device() {
        S_IFBLK
    } else if file_type.is_socket() {
        S_IFSOCK
    } else {
        0
    }
}

/// Permission bits plus type bits.
pub fn mode_of(metadata: &Metadata) -> u32 {
    (metadata.permissions().mode() & PERMISSION_BITS) | type_bits(metadata.file_type())
}

/// Wire attributes for `metadata`.
pub fn attr_of(metadata: &Metadata) -> Attr {
    Attr {
        size: metadata.len(),
        mode: mode_of(metadata),
        nlink: metadata.nlink(),
        atime: Timespec {
            sec: metadata.atime(),
            nsec: metadata.atime_nsec().clamp(0, 999_999_999) as u32,
        },
        mtime: Timespec {
            sec: metadata.mtime(),
            nsec: metadata.mtime_nsec().clamp(0, 999_999_999) as u32,
        },
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn regular_file_and_directory_bits() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        fs::write(&file, b"12345").unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o640)).unwrap();

        let attr = attr_of(&fs::symlink_metadata(&file).unwrap());
        assert_eq!(attr.mode, S_IFREG | 0o640);
        assert_eq!(attr.size, 5);
        assert_eq!(attr.nlink, 1);

        let dir_mode = mode_of(&fs::symlink_metadata(dir.path()).unwrap());
        assert_eq!(dir_mode & !PERMISSION_BITS, S_IFDIR);
    }

    #[test]
    fn symlink_is_not_followed() {
        let dir = tempfile::tempdir().unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink("nowhere", &link).unwrap();

        let mode = mode_of(&fs::symlink_metadata(&link).unwrap());
        assert_eq!(mode & !PERMISSION_BITS, S_IFLNK);
    }

    #[test]
    fn mtime_matches_system_time() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("t");
        fs::write(&file, b"").unwrap();

        let metadata = fs::metadata(&file).unwrap();
        let attr = attr_of(&metadata);
        assert_eq!(Timespec::from(metadata.modified().unwrap()), attr.mtime);
    }
}
