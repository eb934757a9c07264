use std::time::{Duration, SystemTime, UNIX_EPOCH};

use url::Url;

use crate::{
    filesystem::{FileStatus, FsAction, FsPath, FsPermission, DEFAULT_BLOCK_SIZE},
    transport::{RemoteAttrs, RemoteDirEntry},
};

/// Decodes one `rwx` group. Anything other than `r`, `w` or `x` grants nothing.
pub fn decode_action(group: &str) -> FsAction {
    group.chars().fold(FsAction::empty(), |action, c| match c {
        'r' => action | FsAction::READ,
        'w' => action | FsAction::WRITE,
        'x' => action | FsAction::EXECUTE,
        _ => action,
    })
}

/// Decodes an `ls -l` style permission string such as `drwxr-x---`.
pub fn decode_permissions(permissions: &str) -> FsPermission {
    let chars: Vec<char> = permissions.chars().collect();
    let group = |from: usize, to: usize| -> String {
        chars.get(from..to.min(chars.len())).map(|s| s.iter().collect()).unwrap_or_default()
    };
    FsPermission::new(
        decode_action(&group(1, 4)),
        decode_action(&group(4, 7)),
        decode_action(&group(7, 10)),
    )
}

fn to_system_time(seconds: u32) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(u64::from(seconds))
}

/// Status of `attrs` describing `path`, which must already be absolute.
pub fn attrs_to_status(attrs: &RemoteAttrs, path: &FsPath, uri: &Url) -> FileStatus {
    FileStatus {
        len: Some(attrs.size),
        is_dir: attrs.is_dir,
        replication: 1,
        block_size: DEFAULT_BLOCK_SIZE,
        modification_time: Some(to_system_time(attrs.mtime)),
        access_time: Some(to_system_time(attrs.atime)),
        permission: decode_permissions(&attrs.permissions),
        owner: attrs.uid.to_string(),
        group: attrs.gid.to_string(),
        path: path.make_qualified(uri),
    }
}

/// Status of a listing entry found in `parent`.
pub fn entry_to_status(entry: &RemoteDirEntry, parent: &FsPath, uri: &Url) -> FileStatus {
    attrs_to_status(&entry.attrs, &parent.child(&entry.filename), uri)
}

/// The root has no parent to list it, so its record is synthesized.
pub fn root_status(uri: &Url) -> FileStatus {
    FileStatus {
        len: None,
        is_dir: true,
        replication: 1,
        block_size: DEFAULT_BLOCK_SIZE,
        modification_time: None,
        access_time: None,
        permission: FsPermission::default(),
        owner: String::new(),
        group: String::new(),
        path: FsPath::root().make_qualified(uri),
    }
}
