use std::path::{Component, Path};

use crate::error::FileError;

/// 确认 `name` 只是一个普通的路径分量，可以安全地拼到目录后面
///
/// 拒绝空串、`.`、`..`、绝对路径以及任何带分隔符的名称
pub fn plain_file_name(name: &str) -> Result<&str, FileError> {
    let invalid = || FileError::InvalidName {
        name: name.to_string(),
    };
    if name.contains(['/', '\\']) {
        return Err(invalid());
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(name),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_names_are_accepted() {
        assert_eq!(plain_file_name("math").unwrap(), "math");
        assert_eq!(plain_file_name("math-01_2024").unwrap(), "math-01_2024");
    }

    #[test]
    fn test_traversal_and_separators_are_rejected() {
        for name in ["", ".", "..", "../x", "a/b", "/etc", "a\\b", "..\\x"] {
            assert!(
                matches!(plain_file_name(name), Err(FileError::InvalidName { .. })),
                "{name:?} 应被拒绝"
            );
        }
    }
}
