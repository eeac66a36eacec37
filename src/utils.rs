use std::{ env, io, path::PathBuf };

const CONFIG_SUBDIR: &str = "configs";

/// Base directory for `configs/`: the working directory in tests, otherwise the
/// directory holding the executable.
fn base_dir(test_env: bool) -> io::Result<PathBuf> {
    if test_env {
        return env::current_dir();
    }
    let exe = env::current_exe()?;
    exe.parent()
        .map(|p| p.to_path_buf())
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "executable has no parent directory"))
}

pub fn config_dir(test_env: bool) -> io::Result<PathBuf> {
    Ok(base_dir(test_env)?.join(CONFIG_SUBDIR))
}

/// An explicitly given directory wins over the default location.
pub fn intel_config_dir(explicit: Option<PathBuf>) -> io::Result<PathBuf> {
    match explicit {
        Some(d) => Ok(d),
        None => config_dir(false),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_config_dir() {
        let d = config_dir(true).unwrap();
        assert!(d.ends_with("configs"));
        assert_eq!(d.parent().unwrap(), env::current_dir().unwrap());
        assert!(config_dir(false).unwrap().ends_with("configs"));
    }

    #[test]
    fn test_intel_config_dir() {
        let d = intel_config_dir(Some(PathBuf::from("/etc/ipcheck"))).unwrap();
        assert_eq!(d, PathBuf::from("/etc/ipcheck"));
        assert_eq!(intel_config_dir(None).unwrap(), config_dir(false).unwrap());
    }
}
