// Copyright 2024 RustFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Object key helpers. Object keys always use `/`, independent of the host OS.

pub const SLASH_SEPARATOR: &str = "/";

/// retain_slash ensures that the given string `s` ends with a slash.
/// Empty input stays empty.
pub fn retain_slash(s: &str) -> String {
    if s.is_empty() {
        return s.to_string();
    }
    if s.ends_with(SLASH_SEPARATOR) {
        s.to_string()
    } else {
        format!("{s}{SLASH_SEPARATOR}")
    }
}

/// Whether a listing entry name denotes a directory (a common prefix).
pub fn is_dir_entry(name: &str) -> bool {
    name.ends_with(SLASH_SEPARATOR)
}

/// path_join_buf joins string path elements into a single cleaned key.
/// A trailing slash on the last element is preserved.
pub fn path_join_buf(elements: &[&str]) -> String {
    let trailing_slash = elements.last().is_some_and(|last| last.ends_with(SLASH_SEPARATOR));

    let joined = elements.iter().filter(|e| !e.is_empty()).copied().collect::<Vec<_>>().join(SLASH_SEPARATOR);
    if joined.is_empty() {
        return String::new();
    }

    let mut cleaned = clean(&joined);
    if trailing_slash && !cleaned.ends_with(SLASH_SEPARATOR) {
        cleaned.push_str(SLASH_SEPARATOR);
    }
    cleaned
}

/// clean returns the shortest path equivalent to `path` by lexical processing:
/// repeated slashes collapse, `.` elements vanish, and `..` removes the preceding
/// element. A `..` that would escape a rooted path is dropped.
///
/// An empty result is returned as `"."`.
pub fn clean(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }

    let rooted = path.starts_with(SLASH_SEPARATOR);
    let mut comps: Vec<&str> = Vec::new();
    for comp in path.split(SLASH_SEPARATOR) {
        match comp {
            "" | "." => {}
            ".." => {
                if comps.last().is_some_and(|last| *last != "..") {
                    comps.pop();
                } else if !rooted {
                    comps.push("..");
                }
            }
            other => comps.push(other),
        }
    }

    let body = comps.join(SLASH_SEPARATOR);
    match (rooted, body.is_empty()) {
        (true, _) => format!("{SLASH_SEPARATOR}{body}"),
        (false, true) => ".".to_string(),
        (false, false) => body,
    }
}

/// dir returns everything but the last element of `path`, cleaned.
pub fn dir(path: &str) -> String {
    match path.rfind(SLASH_SEPARATOR) {
        Some(idx) => clean(&path[..=idx]),
        None => ".".to_string(),
    }
}

/// base_dir_from_prefix extracts the directory part of a listing prefix,
/// always ending with a slash, or empty when the prefix has no directory.
pub fn base_dir_from_prefix(prefix: &str) -> String {
    if !prefix.contains(SLASH_SEPARATOR) {
        return String::new();
    }
    let mut base_dir = dir(prefix);
    if base_dir == "." || base_dir == SLASH_SEPARATOR {
        base_dir.clear();
    }
    if !base_dir.is_empty() && !base_dir.ends_with(SLASH_SEPARATOR) {
        base_dir.push_str(SLASH_SEPARATOR);
    }
    base_dir
}

/// Strip surrounding quotes from an ETag.
pub fn trim_etag(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean() {
        let cases = [
            ("", "."),
            ("abc", "abc"),
            ("abc/def", "abc/def"),
            ("a//b", "a/b"),
            ("a/./b", "a/b"),
            ("a/b/../c", "a/c"),
            ("/../a", "/a"),
            ("../a", "../a"),
            ("a/../..", ".."),
            ("/", "/"),
            ("abc/", "abc"),
        ];
        for (input, want) in cases {
            assert_eq!(clean(input), want, "clean({input:?})");
        }
    }

    #[test]
    fn test_path_join_buf() {
        assert_eq!(path_join_buf(&["bucket", "a/b", "xl.meta"]), "bucket/a/b/xl.meta");
        assert_eq!(path_join_buf(&["bucket", "", "dir/"]), "bucket/dir/");
        assert_eq!(path_join_buf(&["a", "../b"]), "b");
        assert_eq!(path_join_buf(&[]), "");
    }

    #[test]
    fn test_base_dir_from_prefix() {
        assert_eq!(base_dir_from_prefix("photos/2024/jan"), "photos/2024/");
        assert_eq!(base_dir_from_prefix("photos/"), "photos/");
        assert_eq!(base_dir_from_prefix("photos"), "");
        assert_eq!(base_dir_from_prefix(""), "");
    }

    #[test]
    fn test_retain_slash_and_dir_entry() {
        assert_eq!(retain_slash("a"), "a/");
        assert_eq!(retain_slash("a/"), "a/");
        assert_eq!(retain_slash(""), "");
        assert!(is_dir_entry("a/"));
        assert!(!is_dir_entry("a"));
    }

    #[test]
    fn test_trim_etag() {
        assert_eq!(trim_etag("\"abc\""), "abc");
        assert_eq!(trim_etag("abc"), "abc");
    }
}
