//! Name rewriting for the different places a class name can appear.

use stowage_core::RelocationRules;

/// Prefix of multi-release class and resource entries.
const VERSIONS_PREFIX: &str = "META-INF/versions/";

/// Rewrite the name held by a `Class` constant: an internal name such as
/// `a/b/C`, or an array descriptor such as `[La/b/C;`.
pub(crate) fn map_internal_name(name: &str, rules: &RelocationRules) -> Option<String> {
    if name.starts_with('[') {
        map_signature(name, rules)
    } else {
        rules.map_path(name)
    }
}

/// Rewrite a string literal that names a class or a resource.
///
/// Dotted class names (`a.b.C`) and slashed paths (`a/b/C`, `a/b/res.txt`)
/// are relocated; so are field descriptors (`La/b/C;`, `[La/b/C;`).
/// Anything else is left alone.
pub(crate) fn map_string_literal(value: &str, rules: &RelocationRules) -> Option<String> {
    if !value.contains('/') {
        return rules.map_class(value);
    }
    if let Some(mapped) = rules.map_path(value) {
        return Some(mapped);
    }
    if is_field_descriptor(value) {
        return map_signature(value, rules);
    }
    None
}

fn is_field_descriptor(value: &str) -> bool {
    let element = value.trim_start_matches('[');
    element.starts_with('L') && element.ends_with(';')
}

/// Whether a `Utf8` constant might be a descriptor or generic signature.
pub(crate) fn looks_like_signature(value: &str) -> bool {
    value.contains(';') || value.starts_with('(')
}

/// Rewrite every class name inside a descriptor or generic signature.
///
/// Returns `None` when nothing changed or when `value` does not parse as a
/// descriptor or signature.
pub(crate) fn map_signature(value: &str, rules: &RelocationRules) -> Option<String> {
    let mut rewriter = SignatureRewriter {
        input: value,
        bytes: value.as_bytes(),
        pos: 0,
        out: String::with_capacity(value.len()),
        rules,
        changed: false,
    };
    rewriter.signature()?;
    rewriter.changed.then_some(rewriter.out)
}

/// Recursive-descent rewriter over the descriptor and signature grammar.
///
/// Structural characters are ASCII, so byte positions at them are always
/// valid `str` boundaries even when names contain multi-byte characters.
struct SignatureRewriter<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
    out: String,
    rules: &'a RelocationRules,
    changed: bool,
}

// Positions only advance while below the input length.
#[allow(clippy::arithmetic_side_effects)]
impl<'a> SignatureRewriter<'a> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn copy(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.out.push(char::from(b));
        self.pos += 1;
        Some(b)
    }

    fn expect(&mut self, b: u8) -> Option<()> {
        (self.copy()? == b).then_some(())
    }

    /// Copy up to (not including) the first of `stops`.
    fn take_until(&mut self, stops: &[u8]) -> Option<&'a str> {
        let input = self.input;
        let start = self.pos;
        while !stops.contains(&self.peek()?) {
            self.pos += 1;
        }
        input.get(start..self.pos)
    }

    /// Field descriptor, method descriptor, or class/method/field signature.
    fn signature(&mut self) -> Option<()> {
        if self.peek()? == b'<' {
            self.formal_type_parameters()?;
        }
        if self.peek()? == b'(' {
            self.method_tail()?;
        } else {
            while !self.at_end() {
                self.type_signature()?;
            }
        }
        self.at_end().then_some(())
    }

    fn formal_type_parameters(&mut self) -> Option<()> {
        self.expect(b'<')?;
        while self.peek()? != b'>' {
            let identifier = self.take_until(b":")?;
            self.out.push_str(identifier);
            while self.peek() == Some(b':') {
                self.copy()?;
                if matches!(self.peek()?, b'L' | b'T' | b'[') {
                    self.type_signature()?;
                }
            }
        }
        self.expect(b'>')
    }

    fn method_tail(&mut self) -> Option<()> {
        self.expect(b'(')?;
        while self.peek()? != b')' {
            self.type_signature()?;
        }
        self.expect(b')')?;
        if self.peek()? == b'V' {
            self.copy()?;
        } else {
            self.type_signature()?;
        }
        while self.peek() == Some(b'^') {
            self.copy()?;
            self.type_signature()?;
        }
        Some(())
    }

    fn type_signature(&mut self) -> Option<()> {
        match self.peek()? {
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' => {
                self.copy()?;
            },
            b'[' => {
                self.copy()?;
                self.type_signature()?;
            },
            b'T' => {
                self.copy()?;
                let variable = self.take_until(b";")?;
                self.out.push_str(variable);
                self.expect(b';')?;
            },
            b'L' => self.class_type_signature()?,
            _ => return None,
        }
        Some(())
    }

    fn class_type_signature(&mut self) -> Option<()> {
        self.expect(b'L')?;
        let name = self.take_until(b";<.")?;
        match self.rules.map_path(name) {
            Some(mapped) => {
                self.out.push_str(&mapped);
                self.changed = true;
            },
            None => self.out.push_str(name),
        }
        loop {
            match self.peek()? {
                b'<' => self.type_arguments()?,
                b'.' => {
                    // Inner class suffix: a simple name, never relocated.
                    self.copy()?;
                    let simple = self.take_until(b";<.")?;
                    self.out.push_str(simple);
                },
                b';' => {
                    self.copy()?;
                    return Some(());
                },
                _ => return None,
            }
        }
    }

    fn type_arguments(&mut self) -> Option<()> {
        self.expect(b'<')?;
        while self.peek()? != b'>' {
            match self.peek()? {
                b'*' => {
                    self.copy()?;
                },
                b'+' | b'-' => {
                    self.copy()?;
                    self.type_signature()?;
                },
                _ => self.type_signature()?,
            }
        }
        self.expect(b'>')
    }
}

/// Rewrite an archive entry name: class files, resources and directories
/// under a relocated package, including multi-release entries below
/// `META-INF/versions/<n>/`.
pub(crate) fn map_entry_name(name: &str, rules: &RelocationRules) -> Option<String> {
    let (prefix, rest) = split_versioned(name);
    let (body, suffix) = if let Some(body) = rest.strip_suffix(".class") {
        (body, ".class")
    } else if let Some(body) = rest.strip_suffix('/') {
        (body, "/")
    } else {
        (rest, "")
    };
    if body.is_empty() {
        return None;
    }
    let mapped = rules.map_path(body)?;
    Some(format!("{prefix}{mapped}{suffix}"))
}

/// Split `META-INF/versions/<n>/rest` into its prefix and `rest`.
fn split_versioned(name: &str) -> (&str, &str) {
    let Some(after) = name.strip_prefix(VERSIONS_PREFIX) else {
        return ("", name);
    };
    let Some((version, rest)) = after.split_once('/') else {
        return ("", name);
    };
    if version.is_empty() || !version.bytes().all(|b| b.is_ascii_digit()) {
        return ("", name);
    }
    let prefix_len = name.len().saturating_sub(rest.len());
    name.split_at_checked(prefix_len).unwrap_or(("", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> RelocationRules {
        RelocationRules::from_pairs([("a.b", "x.y"), ("com.lib", "shaded.lib")]).unwrap()
    }

    #[test]
    fn internal_names() {
        let r = rules();
        assert_eq!(map_internal_name("a/b/C", &r).as_deref(), Some("x/y/C"));
        assert_eq!(map_internal_name("[[La/b/C;", &r).as_deref(), Some("[[Lx/y/C;"));
        assert_eq!(map_internal_name("a/bc/D", &r), None);
        assert_eq!(map_internal_name("[I", &r), None);
    }

    #[test]
    fn field_and_method_descriptors() {
        let r = rules();
        assert_eq!(map_signature("La/b/C;", &r).as_deref(), Some("Lx/y/C;"));
        assert_eq!(
            map_signature("(ILa/b/C;[Lcom/lib/D;)La/b/E;", &r).as_deref(),
            Some("(ILx/y/C;[Lshaded/lib/D;)Lx/y/E;")
        );
        assert_eq!(map_signature("(IJ)V", &r), None);
    }

    #[test]
    fn generic_signatures() {
        let r = rules();
        assert_eq!(
            map_signature("Ljava/util/List<La/b/C;>;", &r).as_deref(),
            Some("Ljava/util/List<Lx/y/C;>;")
        );
        assert_eq!(
            map_signature("<T:La/b/Base;>Ljava/lang/Object;Lcom/lib/Api<TT;>;", &r).as_deref(),
            Some("<T:Lx/y/Base;>Ljava/lang/Object;Lshaded/lib/Api<TT;>;")
        );
        assert_eq!(
            map_signature("<E::La/b/I;>(TE;)La/b/Outer<*>.Inner<+La/b/C;>;^La/b/Ex;", &r)
                .as_deref(),
            Some("<E::Lx/y/I;>(TE;)Lx/y/Outer<*>.Inner<+Lx/y/C;>;^Lx/y/Ex;")
        );
    }

    #[test]
    fn type_variables_are_not_class_names() {
        let r = RelocationRules::from_pairs([("a", "z")]).unwrap();
        assert_eq!(map_signature("TLa;", &r), None);
        assert_eq!(map_signature("(TLa;)La/C;", &r).as_deref(), Some("(TLa;)Lz/C;"));
    }

    #[test]
    fn non_signatures_are_untouched() {
        let r = rules();
        assert_eq!(map_signature("select a; from b", &r), None);
        assert_eq!(map_signature("La/b/C", &r), None);
    }

    #[test]
    fn string_literals() {
        let r = rules();
        assert_eq!(map_string_literal("a.b.Service", &r).as_deref(), Some("x.y.Service"));
        assert_eq!(
            map_string_literal("a/b/messages.properties", &r).as_deref(),
            Some("x/y/messages.properties")
        );
        assert_eq!(map_string_literal("[La/b/C;", &r).as_deref(), Some("[Lx/y/C;"));
        assert_eq!(map_string_literal("hello a.b", &r), None);
        assert_eq!(map_string_literal("a.bc.D", &r), None);
    }

    #[test]
    fn entry_names() {
        let r = rules();
        assert_eq!(map_entry_name("a/b/C.class", &r).as_deref(), Some("x/y/C.class"));
        assert_eq!(map_entry_name("a/b/", &r).as_deref(), Some("x/y/"));
        assert_eq!(
            map_entry_name("a/b/res/data.txt", &r).as_deref(),
            Some("x/y/res/data.txt")
        );
        assert_eq!(
            map_entry_name("META-INF/versions/11/a/b/C.class", &r).as_deref(),
            Some("META-INF/versions/11/x/y/C.class")
        );
        assert_eq!(map_entry_name("META-INF/MANIFEST.MF", &r), None);
        assert_eq!(map_entry_name("a/", &r), None);
    }
}
