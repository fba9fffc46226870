use path_absolutize::Absolutize;
use std::ffi::OsString;
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// A path decomposed into its directory, name and extension.
///
/// Every field is derived from the absolute path in one place; the update
/// methods never touch a single field but build a new descriptor. The string
/// accessors are lossy for non-UTF-8 names; the updates work on the raw path
/// so such names keep their bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathDescriptor {
    abs: PathBuf,
    rel: PathBuf,
    dir: PathBuf,
    file_name: String,
    base_name: String,
    extension: String,
    cwd: PathBuf,
}

impl PathDescriptor {
    /// Describe `path`, absolutizing it lexically against `cwd` when relative.
    pub fn new(path: impl AsRef<Path>, cwd: &Path) -> std::io::Result<Self> {
        let abs = path.as_ref().absolutize_from(cwd)?.into_owned();
        Ok(Self::derive(abs, cwd))
    }

    fn derive(abs: PathBuf, cwd: &Path) -> Self {
        let file_name = abs
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = Path::new(&file_name)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let base_name = file_name[..file_name.len() - extension.len()].to_string();
        let dir = abs.parent().map(Path::to_path_buf).unwrap_or_else(|| abs.clone());
        let rel = relative_to(&abs, cwd);
        Self {
            abs,
            rel,
            dir,
            file_name,
            base_name,
            extension,
            cwd: cwd.to_path_buf(),
        }
    }

    fn rebuild(&self, path: PathBuf) -> Self {
        let abs = match path.absolutize_from(&self.cwd) {
            Ok(abs) => abs.into_owned(),
            Err(_) => path,
        };
        Self::derive(abs, &self.cwd)
    }

    pub fn abs(&self) -> &Path {
        &self.abs
    }

    /// Path relative to the working directory the descriptor was built against.
    pub fn rel(&self) -> &Path {
        &self.rel
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// File name without its extension.
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// Extension including the leading dot, or an empty string.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Same directory and extension, new base name.
    pub fn with_base_name(&self, base_name: &str) -> Self {
        let mut name = OsString::from(base_name);
        if let Some(ext) = self.abs.extension() {
            name.push(".");
            name.push(ext);
        }
        self.rebuild(self.dir.join(name))
    }

    /// Append `suffix` to the base name, keeping the extension.
    pub fn with_base_suffix(&self, suffix: &str) -> Self {
        let mut name = self.abs.file_stem().map(OsString::from).unwrap_or_default();
        name.push(suffix);
        if let Some(ext) = self.abs.extension() {
            name.push(".");
            name.push(ext);
        }
        self.rebuild(self.dir.join(name))
    }

    /// Same directory and base name, new extension (leading dot expected).
    pub fn with_extension(&self, extension: &str) -> Self {
        let mut name = self.abs.file_stem().map(OsString::from).unwrap_or_default();
        name.push(extension);
        self.rebuild(self.dir.join(name))
    }

    /// Same file name, new parent directory.
    pub fn with_dir(&self, dir: &Path) -> Self {
        match self.abs.file_name() {
            Some(name) => self.rebuild(dir.join(name)),
            None => self.rebuild(dir.to_path_buf()),
        }
    }

    /// A whole new path against the same working directory.
    pub fn with_path(&self, path: impl Into<PathBuf>) -> Self {
        self.rebuild(path.into())
    }
}

impl fmt::Display for PathDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.rel.display())
    }
}

/// Lexical relative path from `base` to `path`, both absolute.
fn relative_to(path: &Path, base: &Path) -> PathBuf {
    let mut target = path.components();
    let mut from = base.components();
    let mut parts: Vec<Component> = Vec::new();
    loop {
        match (target.next(), from.next()) {
            (None, None) => break,
            (Some(a), None) => {
                parts.push(a);
                parts.extend(target.by_ref());
                break;
            }
            (None, Some(_)) => {
                parts.push(Component::ParentDir);
                parts.extend(from.by_ref().map(|_| Component::ParentDir));
                break;
            }
            (Some(a), Some(b)) if parts.is_empty() && a == b => {}
            (Some(a), Some(_)) => {
                parts.push(Component::ParentDir);
                parts.extend(from.by_ref().map(|_| Component::ParentDir));
                parts.push(a);
                parts.extend(target.by_ref());
                break;
            }
        }
    }
    if parts.is_empty() {
        PathBuf::from(".")
    } else {
        parts.iter().map(|c| c.as_os_str()).collect()
    }
}
