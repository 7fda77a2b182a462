//! Executable-bit detection (§6): a materialized revision is mode 0755
//! when it looks like a shebang script, a known script extension, or an
//! ELF binary; otherwise 0644.

const SCRIPT_EXTENSIONS: &[&str] = &["sh", "bash", "ksh", "csh", "pl", "py", "rb"];

pub fn is_executable(path: &str, data: &[u8]) -> bool {
    if data.starts_with(b"#!") {
        return true;
    }
    if data.starts_with(b"\x7fELF") {
        return true;
    }
    match path.rsplit_once('.') {
        Some((_, ext)) => SCRIPT_EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(ext)),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shebang() {
        assert!(is_executable("foo", b"#!/bin/sh\necho hi\n"));
    }

    #[test]
    fn test_elf_magic() {
        assert!(is_executable("foo", b"\x7fELF\x02\x01"));
    }

    #[test]
    fn test_script_extension() {
        assert!(is_executable("tools/build.sh", b"echo hi\n"));
        assert!(!is_executable("tools/build.txt", b"echo hi\n"));
    }

    #[test]
    fn test_plain_text_not_executable() {
        assert!(!is_executable("readme.txt", b"hello\n"));
    }
}
