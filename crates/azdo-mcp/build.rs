use std::path::{Path, PathBuf};
use std::process::Command;

/// Set this to stamp a build made outside a git checkout (for example from a source tarball).
const BUILD_ID_OVERRIDE: &str = "AZDO_MCP_BUILD_ID";

struct GitCheckout {
    git_dir: PathBuf,
    common_dir: PathBuf,
}

impl GitCheckout {
    fn discover() -> Option<Self> {
        let git_dir = PathBuf::from(git(&["rev-parse", "--absolute-git-dir"])?);
        let common_dir = git(&["rev-parse", "--git-common-dir"])
            .map(|raw| absolute(Path::new(&raw)))
            .unwrap_or_else(|| git_dir.clone());
        Some(Self {
            git_dir,
            common_dir,
        })
    }

    /// Files whose change means HEAD, the branch tip or the dirty flag may have moved.
    fn watched_files(&self) -> Vec<PathBuf> {
        let mut files = vec![
            self.git_dir.join("HEAD"),
            self.git_dir.join("index"),
            self.common_dir.join("packed-refs"),
        ];
        if let Some(branch_ref) = git(&["symbolic-ref", "-q", "HEAD"]) {
            files.push(self.common_dir.join(branch_ref));
        }
        files
    }

    fn build_id(&self) -> String {
        let count = git(&["rev-list", "--count", "HEAD"]).unwrap_or_else(|| "0".to_string());
        let sha = git(&["rev-parse", "--short", "HEAD"]).unwrap_or_else(|| "nogit".to_string());
        let dirty = git(&["status", "--porcelain"]).map_or(true, |status| !status.is_empty());
        format!("git.{count}.{sha}{}", if dirty { ".dirty" } else { "" })
    }
}

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout)
        .ok()
        .map(|text| text.trim().to_string())
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

fn main() {
    println!("cargo:rerun-if-env-changed={BUILD_ID_OVERRIDE}");

    let build_id = match std::env::var(BUILD_ID_OVERRIDE) {
        Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
        _ => match GitCheckout::discover() {
            Some(checkout) => {
                for file in checkout.watched_files() {
                    println!("cargo:rerun-if-changed={}", file.display());
                }
                checkout.build_id()
            }
            None => "git.0.nogit".to_string(),
        },
    };

    println!("cargo:rustc-env=AZDO_MCP_BUILD={build_id}");
}
