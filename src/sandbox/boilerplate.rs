//! Code wrapping that keeps the sandbox-side artifact store in sync.
//!
//! Every cell sent to the sandbox loads the shared artifact file into an
//! `artifacts` mapping before the model's code runs and writes it back in a
//! `finally` block. The flush goes through a private binding and an absolute
//! path, so it happens even when that code raises, rebinds `artifacts` or
//! changes directory.

use std::path::Path;

use crate::artifacts::{ARTIFACT_FORMAT, ARTIFACT_VERSION};

/// Python-side reader/writer for the artifact file format.
const ARTIFACTS_HELPER: &str = r#"import json as _ca_json
import os as _ca_os


class Artifacts:
    def __init__(self, path):
        self.path = path
        self._data = {}

    def load(self):
        with open(self.path, "r", encoding="utf-8") as f:
            doc = _ca_json.load(f)
        if doc.get("format") != __FORMAT__ or doc.get("version") != __VERSION__:
            raise ValueError("unsupported artifact file " + self.path)
        entries = doc.get("artifacts", {})
        if doc.get("count") != len(entries):
            raise ValueError("artifact count mismatch in " + self.path)
        self._data = {
            name: bytes(entry["data"]) if entry.get("kind") == "bytes" else None
            for name, entry in entries.items()
        }

    def save(self):
        entries = {}
        for name, value in self._data.items():
            if value is None:
                entries[name] = {"kind": "placeholder"}
            else:
                entries[name] = {"kind": "bytes", "data": list(value)}
        doc = {
            "format": __FORMAT__,
            "version": __VERSION__,
            "count": len(entries),
            "artifacts": entries,
        }
        tmp = self.path + ".tmp"
        with open(tmp, "w", encoding="utf-8") as f:
            _ca_json.dump(doc, f)
        _ca_os.replace(tmp, self.path)

    def __getitem__(self, name):
        return self._data[name]

    def __setitem__(self, name, value):
        if not isinstance(name, str):
            raise TypeError("artifact names must be str, not " + type(name).__name__)
        if isinstance(value, str):
            value = value.encode("utf-8")
        elif isinstance(value, (bytes, bytearray, memoryview)):
            value = bytes(value)
        else:
            raise TypeError(
                "artifact %r must be str or bytes-like, not %s" % (name, type(value).__name__)
            )
        self._data[name] = value

    def __delitem__(self, name):
        del self._data[name]

    def __contains__(self, name):
        return name in self._data

    def __iter__(self):
        return iter(self._data)

    def __len__(self):
        return len(self._data)

    def keys(self):
        return self._data.keys()
"#;

/// Name the wrapper keeps its own reference to the store under.
const STORE_BINDING: &str = "_ca_store";

/// Builds the source text actually executed for a model-provided cell.
#[derive(Debug, Clone, Default)]
pub struct Boilerplate {
    /// Extra lines run before the artifact store is loaded, e.g. tool imports.
    prelude: Vec<String>,
}

impl Boilerplate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a line to run before the model's code.
    pub fn with_prelude(mut self, line: impl Into<String>) -> Self {
        self.prelude.push(line.into());
        self
    }

    /// Wraps `code` so that it runs with the artifact store at `store_path`
    /// in scope as `artifacts`.
    ///
    /// `store_path` should be absolute inside the sandbox; a relative path is
    /// resolved against whatever directory the code leaves behind.
    pub fn wrap(&self, code: &str, store_path: &Path) -> String {
        let helper = ARTIFACTS_HELPER
            .replace("__FORMAT__", &py_str(ARTIFACT_FORMAT))
            .replace("__VERSION__", &ARTIFACT_VERSION.to_string());

        let mut source = String::with_capacity(helper.len() + code.len() + 256);
        source.push_str(&helper);
        source.push('\n');
        for line in &self.prelude {
            source.push_str(line);
            source.push('\n');
        }
        source.push_str(&format!(
            "{STORE_BINDING} = Artifacts({})\n",
            py_str(&store_path.to_string_lossy())
        ));
        source.push_str(&format!("{STORE_BINDING}.load()\n"));
        source.push_str(&format!("artifacts = {STORE_BINDING}\n"));
        source.push_str("try:\n");
        source.push_str(&format!(
            "    exec(compile({}, \"<agent>\", \"exec\"), globals())\n",
            py_str(code)
        ));
        source.push_str("finally:\n");
        source.push_str(&format!("    {STORE_BINDING}.save()\n"));
        source
    }
}

/// Quotes `s` as a Python string literal.
///
/// JSON string escapes are a subset of Python's, so a JSON-encoded string is
/// a valid Python literal with the same value.
fn py_str(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn wrapped_code_loads_runs_and_saves() {
        let source =
            Boilerplate::new().wrap("print(len(artifacts))", &PathBuf::from("/sb/work/artifacts.json"));

        let load = source.find("_ca_store.load()").unwrap();
        let exec = source.find("exec(compile(").unwrap();
        let save = source.rfind("    _ca_store.save()").unwrap();
        assert!(load < exec && exec < save);
        assert!(source.contains("_ca_store = Artifacts(\"/sb/work/artifacts.json\")"));
        assert!(source.contains("artifacts = _ca_store\n"));
    }

    #[test]
    fn flush_does_not_depend_on_the_public_name() {
        let source = Boilerplate::new().wrap("artifacts = None", &PathBuf::from("/sb/a.json"));
        let finally = source.rfind("finally:").unwrap();
        assert_eq!(&source[finally..], "finally:\n    _ca_store.save()\n");
    }

    #[test]
    fn helper_rejects_values_that_are_not_text_or_bytes() {
        let source = Boilerplate::new().wrap("pass", &PathBuf::from("/sb/a.json"));
        assert!(source.contains("raise TypeError("));
        assert!(source.contains("(bytes, bytearray, memoryview)"));
        assert!(!source.contains("def show("));
    }

    #[test]
    fn helper_placeholders_are_substituted() {
        let source = Boilerplate::new().wrap("pass", &PathBuf::from("a.json"));
        assert!(!source.contains("__FORMAT__"));
        assert!(!source.contains("__VERSION__"));
        assert!(source.contains("\"code-act-artifacts\""));
    }

    #[test]
    fn user_code_is_quoted_not_inlined() {
        let code = "x = \"quoted\"\nif x:\n    print('multi\\nline')";
        let source = Boilerplate::new().wrap(code, &PathBuf::from("a.json"));
        assert!(source.contains(&py_str(code)));
        assert!(!source.contains("\nif x:\n"));
    }

    #[test]
    fn prelude_runs_before_artifacts_load() {
        let source = Boilerplate::new()
            .with_prelude("from tools import *")
            .wrap("pass", &PathBuf::from("a.json"));
        assert!(source.find("from tools import *").unwrap() < source.find("_ca_store.load()").unwrap());
    }

    #[test]
    fn py_str_escapes_quotes_and_newlines() {
        assert_eq!(py_str("a\"b\nc"), r#""a\"b\nc""#);
    }
}
