//! Two-stage template rendering.
//!
//! Image templates carry two disjoint placeholder namespaces: `{key}` is
//! resolved here, at seed-build time, from the flat config map; `{{key}}`
//! escapes to a literal `{key}` in the output and is left for cloud-init's
//! own substitution at first boot. Rendering is exactly one pass — the
//! renderer never touches the inner namespace, even when the substitution
//! map happens to contain a matching key.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::MinivirtError;

/// Substitute outer placeholders from `subs`. A `{key}` with no entry in
/// the map is a hard error, never a blank fill.
pub fn render(template: &str, subs: &BTreeMap<String, String>) -> Result<String, MinivirtError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    out.push('{');
                    continue;
                }
                let mut key = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => key.push(c),
                        None => {
                            return Err(MinivirtError::Validation {
                                message: format!("unterminated placeholder '{{{key}' in template"),
                            });
                        }
                    }
                }
                match subs.get(&key) {
                    Some(value) => out.push_str(value),
                    None => return Err(MinivirtError::Template { placeholder: key }),
                }
            }
            '}' => {
                if chars.peek() == Some(&'}') {
                    chars.next();
                    out.push('}');
                } else {
                    return Err(MinivirtError::Validation {
                        message: "unmatched '}' in template".into(),
                    });
                }
            }
            c => out.push(c),
        }
    }

    Ok(out)
}

/// Write rendered text via a temp file + rename, so a failed write never
/// leaves a partial file behind.
pub fn write(path: &Path, text: &str) -> Result<(), MinivirtError> {
    let tmp = match path.file_name().and_then(|f| f.to_str()) {
        Some(name) => path.with_file_name(format!("{name}.tmp")),
        None => {
            return Err(MinivirtError::Validation {
                message: format!("invalid output path: {}", path.display()),
            });
        }
    };

    std::fs::write(&tmp, text).map_err(|e| MinivirtError::Io {
        context: format!("writing {}", tmp.display()),
        source: e,
    })?;
    std::fs::rename(&tmp, path).map_err(|e| MinivirtError::Io {
        context: format!("renaming {} to {}", tmp.display(), path.display()),
        source: e,
    })?;
    Ok(())
}
