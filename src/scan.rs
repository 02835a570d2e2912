use std::path::Path;

/// Prefix of per-release duplicate entries in Java 9+ multi-release jars.
/// Entries under it would collide with the base entries, so archive scans
/// skip them entirely.
pub const MULTI_RELEASE_PREFIX: &str = "META-INF/versions";

pub const CLASS_SUFFIX: &str = ".class";

/// Classification of a discovered file by its suffix. The suffix set is
/// fixed and case-sensitive: anything unrecognized is passed through
/// verbatim on save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Jar,
    Zip,
    Class,
    Other,
}

pub fn classify(file_name: &str) -> FileKind {
    if file_name.ends_with(".jar") {
        FileKind::Jar
    } else if file_name.ends_with(".zip") || file_name.ends_with(".war") || file_name.ends_with(".ear")
    {
        FileKind::Zip
    } else if file_name.ends_with(CLASS_SUFFIX) {
        FileKind::Class
    } else {
        FileKind::Other
    }
}

/// Registry key of an archive unit: the origin-key prefix of the directory
/// holding the archive, joined with the archive's file name.
pub fn archive_key(prefix: &str, file_name: &str) -> String {
    format!("{prefix}/{file_name}")
}

/// Origin-key prefix for an archive nested inside another archive.
///
/// The `.src` marker gives nested archives their own namespace: a
/// `lib/foo.jar` inside `outer.jar` ends up under `outer.jar.src/lib`,
/// which can never collide with a `lib/foo.jar` sitting next to
/// `outer.jar` on disk. Entries without a directory component use their
/// bare name as the scope segment.
pub fn nested_key_prefix(prefix: &str, archive_name: &str, entry_name: &str) -> String {
    let scope = match entry_name.rfind('/') {
        Some(idx) => &entry_name[..idx],
        None => entry_name,
    };
    format!("{prefix}/{archive_name}.src/{scope}")
}

/// Zip-slip check: true when an archive entry name would resolve outside
/// the archive's own directory. Absolute names and `..` traversal past the
/// archive root are escapes; interior `..` that stays inside is not.
pub fn entry_escapes_archive(entry_name: &str) -> bool {
    if entry_name.starts_with('/') || entry_name.starts_with('\\') {
        return true;
    }
    if Path::new(entry_name).is_absolute() {
        return true;
    }

    let mut depth = 0i64;
    for component in entry_name.split(['/', '\\']) {
        match component {
            "" | "." => {}
            ".." => {
                depth -= 1;
                if depth < 0 {
                    return true;
                }
            }
            _ => depth += 1,
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_recognizes_fixed_suffix_set() {
        assert_eq!(classify("demo.jar"), FileKind::Jar);
        assert_eq!(classify("demo.zip"), FileKind::Zip);
        assert_eq!(classify("demo.war"), FileKind::Zip);
        assert_eq!(classify("demo.ear"), FileKind::Zip);
        assert_eq!(classify("A.class"), FileKind::Class);
        assert_eq!(classify("readme.txt"), FileKind::Other);
        // suffix matching is case-sensitive
        assert_eq!(classify("demo.JAR"), FileKind::Other);
    }

    #[test]
    fn archive_key_joins_prefix_and_name() {
        assert_eq!(archive_key("", "demo.jar"), "/demo.jar");
        assert_eq!(archive_key("lib", "demo.jar"), "lib/demo.jar");
    }

    #[test]
    fn nested_key_prefix_scopes_by_entry_directory() {
        assert_eq!(
            nested_key_prefix("", "outer.jar", "lib/foo.jar"),
            "/outer.jar.src/lib"
        );
        assert_eq!(
            nested_key_prefix("a", "outer.jar", "foo.jar"),
            "a/outer.jar.src/foo.jar"
        );
    }

    #[test]
    fn nested_prefix_distinguishes_inner_from_outer_positions() {
        // outer.jar!/a/B.class vs outer.jar!lib/foo.jar!/a/B.class must live
        // in different units
        let outer = archive_key("", "outer.jar");
        let inner = archive_key(&nested_key_prefix("", "outer.jar", "lib/foo.jar"), "foo.jar");
        assert_ne!(outer, inner);
    }

    #[test]
    fn entry_escapes_archive_detects_traversal() {
        assert!(entry_escapes_archive("../../evil.class"));
        assert!(entry_escapes_archive("a/../../evil.class"));
        assert!(entry_escapes_archive("/etc/passwd"));
        assert!(entry_escapes_archive("\\windows\\system32"));

        assert!(!entry_escapes_archive("a/B.class"));
        assert!(!entry_escapes_archive("a/./B.class"));
        assert!(!entry_escapes_archive("a/b/../C.class"));
        assert!(!entry_escapes_archive("META-INF/MANIFEST.MF"));
    }
}
