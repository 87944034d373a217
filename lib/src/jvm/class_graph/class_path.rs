use crate::jvm::class_file::ClassFile;
use crate::jvm::{BinaryName, Error, Name};
use std::path::{Path, PathBuf};

/// Directories in which to look for class files
///
/// A class `a/b/C` is expected at `<directory>/a/b/C.class`. Directories are searched in order.
#[derive(Clone, Debug, Default)]
pub struct ClassPath {
    directories: Vec<PathBuf>,
}

impl ClassPath {
    pub fn new() -> ClassPath {
        ClassPath {
            directories: vec![],
        }
    }

    /// Add a directory to the end of the search path
    pub fn push(&mut self, directory: impl AsRef<Path>) {
        self.directories.push(directory.as_ref().to_path_buf());
    }

    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    /// Location of the class file for a class
    pub fn find(&self, name: &BinaryName) -> Option<PathBuf> {
        let relative = format!("{}.class", name.as_str());
        self.directories
            .iter()
            .map(|directory| directory.join(&relative))
            .find(|path| path.is_file())
    }

    /// Find and parse the class file for a class
    pub fn load(&self, name: &BinaryName) -> Result<Option<ClassFile>, Error> {
        match self.find(name) {
            None => Ok(None),
            Some(path) => {
                log::trace!("Reading {} from {}", name, path.display());
                ClassFile::read_from_path(path).map(Some)
            }
        }
    }
}

impl<P: AsRef<Path>> FromIterator<P> for ClassPath {
    fn from_iter<I: IntoIterator<Item = P>>(directories: I) -> Self {
        let mut class_path = ClassPath::new();
        for directory in directories {
            class_path.push(directory);
        }
        class_path
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn missing_directories() {
        let class_path: ClassPath = vec!["/nonexistent/classes"].into_iter().collect();
        assert_eq!(class_path.directories().len(), 1);
        assert!(class_path.find(&BinaryName::OBJECT).is_none());
        assert!(matches!(class_path.load(&BinaryName::OBJECT), Ok(None)));
    }
}
