#![allow(dead_code)]

use std::fs;
use std::path::Path;

/// A minimal 24-bit BMP with the given dimensions.
pub fn bmp_bytes(width: u32, height: u32) -> Vec<u8> {
    let row_stride = (width * 3).div_ceil(4) * 4;
    let pixel_array_size = row_stride * height;
    let file_size = 54 + pixel_array_size;

    let mut bytes = Vec::with_capacity(file_size as usize);
    bytes.extend_from_slice(b"BM");
    bytes.extend_from_slice(&file_size.to_le_bytes());
    bytes.extend_from_slice(&[0, 0, 0, 0]);
    bytes.extend_from_slice(&54u32.to_le_bytes());

    bytes.extend_from_slice(&40u32.to_le_bytes());
    bytes.extend_from_slice(&(width as i32).to_le_bytes());
    bytes.extend_from_slice(&(height as i32).to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&24u16.to_le_bytes());
    bytes.extend_from_slice(&[0; 24]);

    bytes.resize(file_size as usize, 0);
    bytes
}

pub fn write_bmp(path: &Path, width: u32, height: u32) {
    write_bytes(path, &bmp_bytes(width, height));
}

pub fn write_bytes(path: &Path, contents: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    fs::write(path, contents).expect("write file");
}

pub fn write_text(path: &Path, contents: &str) {
    write_bytes(path, contents.as_bytes());
}

pub fn read_text(path: &Path) -> String {
    fs::read_to_string(path).expect("read file")
}

/// Writes `images/<split>/<stem>.bmp` and `labels/<split>/<stem>.txt` for
/// each `(split, stem)`.
pub fn write_split_pairs(root: &Path, pairs: &[(&str, &str)], label: &str) {
    for (split, stem) in pairs {
        write_bmp(&root.join("images").join(split).join(format!("{stem}.bmp")), 4, 4);
        write_text(&root.join("labels").join(split).join(format!("{stem}.txt")), label);
    }
}

/// Lists file names directly inside `dir`, sorted; empty if it is missing.
pub fn file_names(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|e| e.path().is_file())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
