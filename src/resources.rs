//! Servo resource reader.
//!
//! Servo reads preferences, certificates, public suffix lists and other
//! bundled files through a `ResourceReaderMethods` implementation the
//! embedder registers with `servo::resources::set()`.
//!
//! The `resources/` directory is looked up in:
//! 1. `SANPIX_RESOURCES_PATH`
//! 2. Next to the executable, or the project root when running from
//!    `target/{debug,release}/`
//! 3. The current directory
//!
//! The network error page is built in: it reports the failure to the host
//! through the bridge so the window can offer a retry. The report carries the
//! host's [`ErrorPageToken`], which ordinary pages never see.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::{env, fs};

use servo::resources::{self, Resource};
use tracing::{error, info};

use crate::bridge::{self, ErrorPageToken};

const RESOURCES_ENV: &str = "SANPIX_RESOURCES_PATH";

static RESOURCES_DIR: OnceLock<PathBuf> = OnceLock::new();

const NET_ERROR_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Failed to load</title>
<style>
body { font-family: sans-serif; background: #141414; color: #eee; text-align: center; padding-top: 20vh; }
#reason { color: #aaa; }
</style>
</head>
<body>
<h1>Failed to load the website</h1>
<p id="reason">${reason}</p>
<p>Press F5 to retry.</p>
<script>
(function () {
  var reason = document.getElementById("reason").textContent;
  var target = __BRIDGE__ + "?m=" + encodeURIComponent(__PREFIX__ + reason);
  fetch(target, { mode: "no-cors", cache: "no-store" }).catch(function () {});
})();
</script>
</body>
</html>
"#;

/// Registers the resource reader. Must run before `ServoBuilder::build()`.
pub fn init(error_page_token: ErrorPageToken) -> io::Result<()> {
    let dir = find_resources_dir(&candidate_dirs()).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("Servo 'resources/' directory not found; set {RESOURCES_ENV}"),
        )
    })?;
    let dir = dir.canonicalize()?;
    info!(path = %dir.display(), "Servo resources located");
    let _ = RESOURCES_DIR.set(dir);
    resources::set(Box::new(ResourceReader { error_page_token }));
    Ok(())
}

/// The network error page served by the engine for failed loads.
pub fn net_error_page(token: &ErrorPageToken) -> String {
    NET_ERROR_TEMPLATE
        .replace("__BRIDGE__", &format!("{:?}", bridge::BRIDGE_ENDPOINT))
        .replace("__PREFIX__", &format!("{:?}", token.failure_prefix()))
}

fn candidate_dirs() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Ok(path) = env::var(RESOURCES_ENV) {
        candidates.push(PathBuf::from(path));
    }
    if let Ok(exe) = env::current_exe()
        && let Ok(exe) = exe.canonicalize()
        && let Some(exe_dir) = exe.parent()
    {
        candidates.push(exe_dir.join("resources"));
        if let Some(target_dir) = exe_dir.parent()
            && target_dir.file_name().is_some_and(|n| n == "target")
            && let Some(project_root) = target_dir.parent()
        {
            candidates.push(project_root.join("resources"));
        }
    }
    if let Ok(cwd) = env::current_dir() {
        candidates.push(cwd.join("resources"));
    }
    candidates
}

fn find_resources_dir(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates.iter().find(|p| p.is_dir()).cloned()
}

/// Resolves `file` inside `base`, refusing anything that escapes it.
fn resolve_inside(base: &Path, file: &str) -> io::Result<PathBuf> {
    let canonical = base.join(file).canonicalize()?;
    if !canonical.starts_with(base) {
        return Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            format!("resource path escapes the resources directory: {file}"),
        ));
    }
    Ok(canonical)
}

struct ResourceReader {
    error_page_token: ErrorPageToken,
}

impl resources::ResourceReaderMethods for ResourceReader {
    fn read(&self, file: Resource) -> Vec<u8> {
        if let Resource::NetErrorHTML = file {
            return net_error_page(&self.error_page_token).into_bytes();
        }
        let Some(base) = RESOURCES_DIR.get() else {
            error!("Resource requested before init");
            return Vec::new();
        };
        // Servo has no recovery path for a missing bundled resource.
        match resolve_inside(base, file.filename()).and_then(fs::read) {
            Ok(bytes) => bytes,
            Err(e) => panic!("cannot read Servo resource {:?}: {e}", file.filename()),
        }
    }

    fn sandbox_access_files_dirs(&self) -> Vec<PathBuf> {
        RESOURCES_DIR.get().cloned().into_iter().collect()
    }

    fn sandbox_access_files(&self) -> Vec<PathBuf> {
        vec![]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("sanpix-resources-{name}-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir.canonicalize().unwrap()
    }

    #[test]
    fn test_net_error_page_reports_through_bridge() {
        let token = ErrorPageToken::generate();
        let page = net_error_page(&token);
        assert!(page.contains(r#""https://bridge.sanpix.invalid/post""#));
        assert!(page.contains(&format!("\"LOAD_FAILED:{}:\"", token.as_str())));
        assert!(page.contains("${reason}"));
        assert!(!page.contains("__BRIDGE__"));
    }

    #[test]
    fn test_first_existing_candidate_wins() {
        let present = scratch_dir("present");
        let missing = present.join("does-not-exist");
        let found = find_resources_dir(&[missing, present.clone()]);
        assert_eq!(found, Some(present));
        assert_eq!(find_resources_dir(&[]), None);
    }

    #[test]
    fn test_resolve_inside_rejects_traversal() {
        let base = scratch_dir("base");
        fs::write(base.join("prefs.json"), b"{}").unwrap();
        assert!(resolve_inside(&base, "prefs.json").is_ok());

        let outside = scratch_dir("outside");
        fs::write(outside.join("secret"), b"x").unwrap();
        let escape = format!("../{}/secret", outside.file_name().unwrap().to_string_lossy());
        let err = resolve_inside(&base, &escape).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);

        assert!(resolve_inside(&base, "missing.json").is_err());
    }
}
