//! YOLO label files: discovery, line handling and the rewriting commands.
//!
//! A label file holds one object per line, whitespace separated, starting
//! with the class index. The commands in this module rewrite those files in
//! place ([`normalize`], [`obb_to_poly`]) or into a sibling directory
//! ([`bbox_to_poly`]).

pub mod bbox_to_poly;
pub mod normalize;
pub mod obb_to_poly;

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::ObbkitError;

/// Image extensions recognised when pairing images with labels.
pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];
/// Label file extension.
pub const LABEL_EXTENSION: &str = "txt";

/// How far below the root directory file discovery descends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Depth {
    /// Only direct children of the root.
    TopLevel,
    /// The whole tree.
    Recursive,
}

/// The lines of a label file plus whether it ended with a newline.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelText {
    pub lines: Vec<String>,
    pub trailing_newline: bool,
}

impl LabelText {
    pub fn parse(text: &str) -> Self {
        Self {
            lines: text.lines().map(str::to_string).collect(),
            trailing_newline: text.ends_with('\n'),
        }
    }

    /// Joins `lines` with `\n`, adding a final newline only when the source
    /// had one and there is something to terminate.
    pub fn render(lines: &[String], trailing_newline: bool) -> String {
        let mut text = lines.join("\n");
        if trailing_newline && !lines.is_empty() {
            text.push('\n');
        }
        text
    }
}

/// Fails with [`ObbkitError::DirectoryNotFound`] unless `path` is a directory.
pub fn require_dir(path: &Path) -> Result<(), ObbkitError> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(ObbkitError::DirectoryNotFound {
            path: path.to_path_buf(),
        })
    }
}

/// Collects files under `root` whose extension is in `extensions`
/// (case-insensitive), sorted by path.
pub fn collect_files_with_extensions(
    root: &Path,
    extensions: &[&str],
    depth: Depth,
) -> Result<Vec<PathBuf>, ObbkitError> {
    let mut walker = WalkDir::new(root).follow_links(true);
    if depth == Depth::TopLevel {
        walker = walker.max_depth(1);
    }

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|source| ObbkitError::DirectoryWalk {
            path: root.to_path_buf(),
            message: source.to_string(),
        })?;

        if entry.file_type().is_file() && has_extension(entry.path(), extensions) {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

/// Collects `.txt` files under `root`, failing when the directory is missing
/// or holds none.
pub fn collect_label_files(root: &Path, depth: Depth) -> Result<Vec<PathBuf>, ObbkitError> {
    require_dir(root)?;
    let files = collect_files_with_extensions(root, &[LABEL_EXTENSION], depth)?;
    if files.is_empty() {
        return Err(ObbkitError::NoLabelFiles {
            path: root.to_path_buf(),
        });
    }
    Ok(files)
}

pub fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
        return false;
    };

    allowed
        .iter()
        .any(|allowed_ext| ext.eq_ignore_ascii_case(allowed_ext))
}

/// File name without its extension, used to pair images with labels.
pub fn file_stem(path: &Path) -> Option<String> {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
}

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn label_text_tracks_trailing_newline() {
        let text = LabelText::parse("0 0.5 0.5 0.1 0.1\n\n1 0.2 0.2 0.1 0.1\n");
        assert_eq!(text.lines.len(), 3);
        assert!(text.trailing_newline);
        assert_eq!(
            LabelText::render(&text.lines, text.trailing_newline),
            "0 0.5 0.5 0.1 0.1\n\n1 0.2 0.2 0.1 0.1\n"
        );

        let bare = LabelText::parse("0 0.5 0.5 0.1 0.1");
        assert!(!bare.trailing_newline);
    }

    #[test]
    fn render_skips_newline_for_empty_output() {
        assert_eq!(LabelText::render(&[], true), "");
    }

    #[test]
    fn collect_respects_depth_and_case() {
        let temp = tempfile::tempdir().expect("create temp dir");
        fs::create_dir_all(temp.path().join("train")).expect("create subdir");
        fs::write(temp.path().join("a.txt"), "").expect("write a");
        fs::write(temp.path().join("B.TXT"), "").expect("write b");
        fs::write(temp.path().join("train/c.txt"), "").expect("write c");
        fs::write(temp.path().join("notes.md"), "").expect("write md");

        let top = collect_files_with_extensions(temp.path(), &["txt"], Depth::TopLevel)
            .expect("collect top level");
        assert_eq!(top.len(), 2);

        let all = collect_files_with_extensions(temp.path(), &["txt"], Depth::Recursive)
            .expect("collect recursive");
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn collect_label_files_errors() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let err = collect_label_files(&temp.path().join("missing"), Depth::Recursive).unwrap_err();
        assert!(matches!(err, ObbkitError::DirectoryNotFound { .. }));

        let err = collect_label_files(temp.path(), Depth::Recursive).unwrap_err();
        assert!(matches!(err, ObbkitError::NoLabelFiles { .. }));
    }
}
