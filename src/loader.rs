//! Module loading for `require` and `import`.
//!
//! A [`Loader`] only finds things: the source text of a language module, or a host
//! object to import. Evaluating a module and merging its definitions into the
//! requesting module is done by the evaluator, so every loader gets the same `:refer`
//! semantics.
//!
//! A module that cannot be found is a warning, never an evaluation error.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::PathBuf;

use tracing::debug;

use crate::value::Value;

/// Environment variable holding colon separated module search paths
pub const PATH_VARIABLE: &str = "NANAMILANG_PATH";

/// Source file extension of language modules
pub const MODULE_EXTENSION: &str = "nml";

/// Which definitions of a module are bound unqualified in the requesting module
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refer {
    /// Only the qualified `module/name` bindings
    None,
    All,
    Names(Vec<String>),
}

impl Refer {
    pub fn includes(&self, name: &str) -> bool {
        match self {
            Refer::None => false,
            Refer::All => true,
            Refer::Names(names) => names.iter().any(|n| n == name),
        }
    }
}

pub trait Loader {
    /// Source text of the language module `module`
    fn source(&self, module: &str) -> Option<String>;

    /// Host object registered under `module`, for `import`
    fn host_object(&self, _module: &str) -> Option<Value> {
        None
    }
}

/// Finds nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLoader;

impl Loader for NoLoader {
    fn source(&self, _module: &str) -> Option<String> {
        None
    }
}

/// Modules and host objects registered in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    modules: HashMap<String, String>,
    objects: HashMap<String, Value>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.modules.insert(name.into(), source.into());
        self
    }

    pub fn with_object(mut self, name: impl Into<String>, object: Value) -> Self {
        self.objects.insert(name.into(), object);
        self
    }
}

impl Loader for MemoryLoader {
    fn source(&self, module: &str) -> Option<String> {
        self.modules.get(module).cloned()
    }

    fn host_object(&self, module: &str) -> Option<Value> {
        self.objects.get(module).cloned()
    }
}

/// Reads `<dir>/<module>.nml` from a list of search directories; dots in a module
/// name separate directories (`util.text` is `util/text.nml`)
#[derive(Debug, Clone)]
pub struct PathLoader {
    paths: Vec<PathBuf>,
}

impl PathLoader {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        PathLoader { paths }
    }

    /// Search paths from `NANAMILANG_PATH`, or the working directory when unset
    pub fn from_env() -> Self {
        let paths = match env::var_os(PATH_VARIABLE) {
            Some(value) => env::split_paths(&value).collect(),
            None => vec![PathBuf::from(".")],
        };
        PathLoader { paths }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    fn relative_path(module: &str) -> PathBuf {
        let mut path: PathBuf = module.split('.').collect();
        path.set_extension(MODULE_EXTENSION);
        path
    }
}

impl Loader for PathLoader {
    fn source(&self, module: &str) -> Option<String> {
        let relative = Self::relative_path(module);
        self.paths.iter().find_map(|dir| {
            let candidate = dir.join(&relative);
            match fs::read_to_string(&candidate) {
                Ok(source) => {
                    debug!(module, path = %candidate.display(), "found module source");
                    Some(source)
                }
                Err(_) => None,
            }
        })
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::value::val;
    use std::path::Path;

    #[test]
    fn test_refer_includes() {
        let names = Refer::Names(vec!["a".to_owned()]);
        let test_cases = vec![
            (Refer::None, "a", false),
            (Refer::All, "a", true),
            (names.clone(), "a", true),
            (names, "b", false),
        ];
        for (refer, name, expected) in test_cases {
            assert_eq!(refer.includes(name), expected, "{refer:?} {name}");
        }
    }

    #[test]
    fn test_memory_loader() {
        let loader = MemoryLoader::new()
            .with_module("math", "(def pi 3.14)")
            .with_object("answer", val(42));
        assert_eq!(loader.source("math").as_deref(), Some("(def pi 3.14)"));
        assert!(loader.source("missing").is_none());
        assert_eq!(loader.host_object("answer"), Some(val(42)));
        assert!(NoLoader.source("math").is_none());
        assert!(NoLoader.host_object("answer").is_none());
    }

    #[test]
    fn test_path_loader_reads_module_files() {
        let dir = env::temp_dir().join(format!("nanamilang-loader-{}", std::process::id()));
        fs::create_dir_all(dir.join("util")).unwrap();
        fs::write(dir.join("util").join("text.nml"), "(def greeting \"hi\")").unwrap();

        let loader = PathLoader::new(vec![PathBuf::from("/nonexistent"), dir.clone()]);
        assert_eq!(
            loader.source("util.text").as_deref(),
            Some("(def greeting \"hi\")")
        );
        assert!(loader.source("util.missing").is_none());
        assert_eq!(
            PathLoader::relative_path("util.text"),
            Path::new("util").join("text.nml")
        );

        fs::remove_dir_all(&dir).unwrap();
    }
}
