//! Function code directories on disk

use std::fs;
use std::path::Path;
use tempfile::TempDir;
use tracing::debug;

/// Handler used by the default function configuration
pub const PYTHON_HANDLER: &str = r#"import json


def handler(event, context):
    for record in event["Records"]:
        print(json.dumps({"messageId": record["messageId"], "body": record["body"]}))
"#;

/// A temporary code directory, removed on drop
pub struct CodeDir {
    dir: TempDir,
}

impl CodeDir {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp dir"),
        }
    }

    /// Directory holding `lambda-handler.py`
    pub fn python_handler() -> Self {
        Self::new().with_file("lambda-handler.py", PYTHON_HANDLER)
    }

    pub fn with_file(self, name: &str, content: &str) -> Self {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        fs::write(&path, content).expect("write fixture file");
        debug!(path = %path.display(), "Wrote fixture file");
        self
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

impl Default for CodeDir {
    fn default() -> Self {
        Self::new()
    }
}
