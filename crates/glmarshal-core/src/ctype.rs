use std::fmt;

use serde::{Deserialize, Serialize};

pub const POINTER_BYTES: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct CType {
    text: String,
    base: String,
    base_const: bool,
    pointer_depth: u8,
}

impl CType {
    pub fn parse(raw: &str) -> Self {
        let text = normalize(raw);

        let mut base_const = false;
        let mut pointer_depth = 0u8;
        let mut base_words: Vec<&str> = Vec::new();
        for tok in tokenize(&text) {
            match tok {
                "*" => pointer_depth += 1,
                "const" if pointer_depth == 0 => base_const = true,
                "const" => {}
                word => {
                    if pointer_depth == 0 {
                        base_words.push(word);
                    }
                }
            }
        }

        let base = base_words.join(" ");
        CType {
            text,
            base,
            base_const,
            pointer_depth,
        }
    }

    pub fn void() -> Self {
        CType::parse("void")
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn pointer_depth(&self) -> u8 {
        self.pointer_depth
    }

    pub fn is_pointer(&self) -> bool {
        self.pointer_depth > 0
    }

    pub fn is_void(&self) -> bool {
        self.pointer_depth == 0 && self.base == "void"
    }

    pub fn is_writable_pointer(&self) -> bool {
        self.pointer_depth == 1 && !self.base_const
    }

    pub fn is_readonly_pointer(&self) -> bool {
        self.pointer_depth == 1 && self.base_const
    }

    /// The spelling to use for a by-value struct field: top-level `const` is
    /// dropped from non-pointer types so the field stays assignable.
    pub fn field_spelling(&self) -> String {
        if self.is_pointer() {
            return self.text.clone();
        }
        tokenize(&self.text)
            .filter(|t| *t != "const")
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn is_floating(&self) -> bool {
        self.pointer_depth == 0
            && matches!(
                self.base.as_str(),
                "GLfloat" | "GLclampf" | "GLdouble" | "GLclampd" | "float" | "double"
            )
    }

    pub fn value_size(&self) -> Option<usize> {
        if self.is_pointer() {
            return Some(POINTER_BYTES);
        }
        base_size(&self.base)
    }

    /// Bytes occupied by one element of the pointee. `void` pointees count as
    /// one byte, matching `sizeof(*(void *)p)` under GNU C.
    pub fn element_size(&self) -> Option<usize> {
        match self.pointer_depth {
            0 => None,
            1 if self.base == "void" => Some(1),
            1 => base_size(&self.base),
            _ => Some(POINTER_BYTES),
        }
    }
}

impl fmt::Display for CType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl From<String> for CType {
    fn from(s: String) -> Self {
        CType::parse(&s)
    }
}

impl From<CType> for String {
    fn from(t: CType) -> Self {
        t.text
    }
}

fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for tok in tokenize(raw) {
        if tok == "*" {
            if !out.is_empty() && !out.ends_with('*') {
                out.push(' ');
            }
            out.push('*');
            continue;
        }
        if !out.is_empty() && !out.ends_with('*') {
            out.push(' ');
        }
        out.push_str(tok);
    }
    out
}

fn tokenize(s: &str) -> impl Iterator<Item = &str> + '_ {
    s.split_inclusive(|c: char| c == '*' || c.is_whitespace())
        .flat_map(|chunk| {
            let (word, sep) = match chunk.char_indices().last() {
                Some((idx, c)) if c == '*' || c.is_whitespace() => chunk.split_at(idx),
                _ => (chunk, ""),
            };
            [word.trim(), sep.trim()]
        })
        .filter(|t| !t.is_empty())
}

fn base_size(base: &str) -> Option<usize> {
    let size = match base {
        "GLboolean" | "GLbyte" | "GLubyte" | "GLchar" | "GLcharARB" | "char" | "unsigned char"
        | "signed char" => 1,
        "GLshort" | "GLushort" | "GLhalf" | "GLhalfARB" | "GLhalfNV" | "short" => 2,
        "GLenum" | "GLint" | "GLuint" | "GLsizei" | "GLbitfield" | "GLfloat" | "GLclampf"
        | "GLfixed" | "GLclampx" | "GLhandleARB" | "int" | "unsigned int" | "float" => 4,
        "GLdouble" | "GLclampd" | "GLint64" | "GLint64EXT" | "GLuint64" | "GLuint64EXT"
        | "GLintptr" | "GLsizeiptr" | "GLintptrARB" | "GLsizeiptrARB" | "GLvdpauSurfaceNV"
        | "double" => 8,
        "GLsync" | "GLeglImageOES" | "GLeglClientBufferEXT" | "GLDEBUGPROC" | "GLDEBUGPROCARB"
        | "GLDEBUGPROCKHR" | "GLDEBUGPROCAMD" | "GLVULKANPROCNV" => POINTER_BYTES,
        _ => return None,
    };
    Some(size)
}
