use std::{
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
    process::Command,
};

use rand::distr::{Alphanumeric, SampleString};
use tracing::{debug, info};

use crate::infra::ToraError;

/// Compiles generated C into `out_path` with the external compiler `cc`. The source is
/// written to a uniquely named file next to the binary and removed afterwards.
pub fn compile(c_source: &str, cc: &str, out_path: &Path) -> Result<(), ToraError> {
    let c_path = scratch_path(out_path)?;
    debug!("writing C source to {}", c_path.display());

    let mut c_file = File::create(&c_path)?;
    c_file.write_all(c_source.as_bytes())?;
    c_file.flush()?;

    info!("invoking `{cc}`");
    let status = Command::new(cc)
        .arg(&c_path)
        .arg("-o")
        .arg(out_path)
        .status();

    // the scratch file is not worth failing the build over
    if let Err(err) = fs::remove_file(&c_path) {
        debug!("could not remove {}: {err}", c_path.display());
    }

    let status = status?;
    if !status.success() {
        return Err(ToraError::CCompilerFailed(status));
    }

    Ok(())
}

fn scratch_path(out_path: &Path) -> Result<PathBuf, io::Error> {
    let Some(binary_file_name) = out_path.file_name() else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("`{}` does not name a file", out_path.display()),
        ));
    };

    let slug: String = Alphanumeric.sample_string(&mut rand::rng(), 8);
    let c_file_name = format!("{}.{}.c", binary_file_name.to_string_lossy(), slug);

    Ok(match out_path.parent() {
        Some(parent) => parent.join(c_file_name),
        None => PathBuf::from(c_file_name),
    })
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::scratch_path;

    #[test]
    fn scratch_file_sits_next_to_the_binary() {
        let path = scratch_path(Path::new("build/app")).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();

        assert_eq!(path.parent(), Some(Path::new("build")));
        assert!(name.starts_with("app.") && name.ends_with(".c"));
        assert_eq!(name.len(), "app.".len() + 8 + ".c".len());
    }

    #[test]
    fn directories_are_rejected() {
        assert!(scratch_path(Path::new("/")).is_err());
    }
}
