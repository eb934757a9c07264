use crate::filesystem::FsPath;

/// Makes `path` absolute against `work_dir`. Absolute paths come back unchanged,
/// minus any qualification prefix.
pub fn make_absolute(work_dir: &FsPath, path: &FsPath) -> FsPath {
    if path.is_absolute() {
        return path.unqualified();
    }
    work_dir.unqualified().join(path)
}
