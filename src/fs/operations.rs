use std::fs;
use std::io;
use std::path::Path;

use crate::error::Result;

/// Create a new directory at the given path. Fails if it already exists.
pub fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir(path)?;
    Ok(())
}

/// Rename (move) a file or directory in a single `rename(2)` call.
///
/// No copy+delete fallback: cross-device moves fail. An existing destination is an error, even
/// an empty directory that `rename(2)` would replace.
pub fn rename(from: &Path, to: &Path) -> Result<()> {
    if fs::symlink_metadata(to).is_ok() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} already exists", to.display()),
        )
        .into());
    }
    fs::rename(from, to)?;
    Ok(())
}

/// Delete a directory and everything below it. Anything that is not a directory is refused.
pub fn remove_tree(path: &Path) -> Result<()> {
    if !fs::symlink_metadata(path)?.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a directory", path.display()),
        )
        .into());
    }
    fs::remove_dir_all(path)?;
    Ok(())
}

/// Apply permission bits to a file. No-op on platforms without Unix modes.
pub fn set_mode(path: &Path, mode: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_dir() {
        let tmp = TempDir::new().unwrap();
        let dir_path = tmp.path().join("subdir");
        create_dir(&dir_path).unwrap();
        assert!(dir_path.is_dir());
    }

    #[test]
    fn create_existing_dir_fails() {
        let tmp = TempDir::new().unwrap();
        let dir_path = tmp.path().join("dup");
        create_dir(&dir_path).unwrap();
        assert!(create_dir(&dir_path).is_err());
    }

    #[test]
    fn test_create_dir_missing_parent_fails() {
        let tmp = TempDir::new().unwrap();
        assert!(create_dir(&tmp.path().join("missing").join("child")).is_err());
    }

    #[test]
    fn test_rename_directory_moves_contents() {
        let tmp = TempDir::new().unwrap();
        let old = tmp.path().join("old");
        fs::create_dir_all(old.join("nested")).unwrap();
        fs::write(old.join("nested").join("a.jpg"), "img").unwrap();
        let new = tmp.path().join("new");

        rename(&old, &new).unwrap();
        assert!(!old.exists());
        assert_eq!(
            fs::read_to_string(new.join("nested").join("a.jpg")).unwrap(),
            "img"
        );
    }

    #[test]
    fn test_rename_onto_existing_empty_dir_fails() {
        let tmp = TempDir::new().unwrap();
        let from = tmp.path().join("from");
        let to = tmp.path().join("to");
        fs::create_dir(&from).unwrap();
        fs::create_dir(&to).unwrap();

        let err = rename(&from, &to).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert!(from.exists());
    }

    #[test]
    fn rename_missing_source_fails() {
        let tmp = TempDir::new().unwrap();
        let from = tmp.path().join("no_such_dir");
        let to = tmp.path().join("dest");
        assert!(rename(&from, &to).is_err());
    }

    #[test]
    fn test_remove_tree_recursively() {
        let tmp = TempDir::new().unwrap();
        let dir_path = tmp.path().join("parent");
        let nested_dir = dir_path.join("child");
        fs::create_dir_all(&nested_dir).unwrap();
        fs::File::create(nested_dir.join("file.txt")).unwrap();
        fs::File::create(dir_path.join("root_file.txt")).unwrap();

        remove_tree(&dir_path).unwrap();
        assert!(!dir_path.exists());
    }

    #[test]
    fn test_remove_tree_nonexistent_fails() {
        let tmp = TempDir::new().unwrap();
        assert!(remove_tree(&tmp.path().join("nope")).is_err());
    }

    #[test]
    fn test_remove_tree_refuses_files() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("photo.jpg");
        fs::write(&file, "x").unwrap();
        assert!(remove_tree(&file).is_err());
        assert!(file.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_set_mode() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("thumb-150x150.jpg");
        fs::write(&file, "x").unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o600)).unwrap();

        set_mode(&file, 0o755).unwrap();
        let mode = fs::metadata(&file).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);
    }
}
