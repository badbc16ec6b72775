//! Matching user-supplied source paths against what the target reports.
//!
//! Targets usually only know the bare file name (`Main.java`) or a
//! package-relative path (`com/example/Main.java`), while callers send
//! absolute workspace paths.

use kestrel_config::SourceMatchMode;

pub(crate) fn normalize(path: &str) -> String {
    path.replace('\\', "/")
}

pub(crate) fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

pub(crate) fn source_matches(mode: SourceMatchMode, requested: &str, reported: &str) -> bool {
    let requested = normalize(requested);
    let reported = normalize(reported);
    if requested == reported {
        return true;
    }
    match mode {
        SourceMatchMode::Exact => false,
        SourceMatchMode::Tolerant => {
            is_path_suffix(&requested, &reported)
                || is_path_suffix(&reported, &requested)
                || file_name(&requested) == file_name(&reported)
        }
    }
}

/// `a/b/C.java` ends with `b/C.java`, but not with `/C.java` glued to `xb`.
fn is_path_suffix(path: &str, suffix: &str) -> bool {
    path.strip_suffix(suffix)
        .is_some_and(|rest| rest.is_empty() || rest.ends_with('/') || suffix.starts_with('/'))
}
