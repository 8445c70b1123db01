//! Device module: function declarations and string constants.

use std::fmt;

use crate::error::{LowerError, LowerResult};
use crate::ir::FunctionType;

/// Prefix shared by all compiler intrinsics.
pub const INTRINSIC_PREFIX: &str = "llvm.";

/// Function attributes the emitters attach to declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FnAttribute {
    ReadNone,
    ReadOnly,
    NoUnwind,
    Convergent,
    AlwaysInline,
}

impl FnAttribute {
    pub fn as_str(self) -> &'static str {
        match self {
            FnAttribute::ReadNone => "readnone",
            FnAttribute::ReadOnly => "readonly",
            FnAttribute::NoUnwind => "nounwind",
            FnAttribute::Convergent => "convergent",
            FnAttribute::AlwaysInline => "alwaysinline",
        }
    }
}

impl fmt::Display for FnAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An external function the emitted code calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDecl {
    pub name: String,
    pub ty: FunctionType,
    attributes: Vec<FnAttribute>,
}

impl FunctionDecl {
    pub fn attributes(&self) -> &[FnAttribute] {
        &self.attributes
    }

    pub fn has_attribute(&self, attr: FnAttribute) -> bool {
        self.attributes.contains(&attr)
    }

    /// Add `attr` unless already present.
    pub fn add_attribute(&mut self, attr: FnAttribute) {
        if !self.has_attribute(attr) {
            self.attributes.push(attr);
        }
    }

    pub fn is_intrinsic(&self) -> bool {
        self.name.starts_with(INTRINSIC_PREFIX)
    }
}

impl fmt::Display for FunctionDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "declare {} @{}(", self.ty.ret, self.name)?;
        for (i, param) in self.ty.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", param)?;
        }
        if self.ty.variadic {
            f.write_str(if self.ty.params.is_empty() { "..." } else { ", ..." })?;
        }
        f.write_str(")")?;
        for attr in &self.attributes {
            write!(f, " {}", attr)?;
        }
        Ok(())
    }
}

/// Private NUL-terminated string constant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalString {
    pub name: String,
    pub value: String,
}

/// The module emitted code is appended to.
///
/// Holds declarations only; instruction streams live in the builder.
#[derive(Debug, Clone, Default)]
pub struct DeviceModule {
    name: String,
    target_triple: Option<String>,
    functions: Vec<FunctionDecl>,
    globals: Vec<GlobalString>,
}

impl DeviceModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_target_triple(mut self, triple: impl Into<String>) -> Self {
        self.target_triple = Some(triple.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target_triple(&self) -> Option<&str> {
        self.target_triple.as_deref()
    }

    pub fn function(&self, name: &str) -> Option<&FunctionDecl> {
        self.functions.iter().find(|decl| decl.name == name)
    }

    pub fn functions(&self) -> &[FunctionDecl] {
        &self.functions
    }

    pub fn globals(&self) -> &[GlobalString] {
        &self.globals
    }

    /// Declaration for `name`, created on first request.
    ///
    /// A later request with the same signature returns the same declaration;
    /// a different signature fails with [`LowerError::SignatureMismatch`].
    pub fn get_or_insert_function(
        &mut self,
        name: &str,
        ty: FunctionType,
    ) -> LowerResult<&mut FunctionDecl> {
        match self.functions.iter().position(|decl| decl.name == name) {
            Some(index) => {
                let existing = &mut self.functions[index];
                if existing.ty != ty {
                    return Err(LowerError::SignatureMismatch {
                        name: name.to_string(),
                        existing: existing.ty.to_string(),
                        requested: ty.to_string(),
                    });
                }
                Ok(existing)
            }
            None => {
                tracing::trace!(function = name, signature = %ty, "declaring function");
                self.functions.push(FunctionDecl {
                    name: name.to_string(),
                    ty,
                    attributes: Vec::new(),
                });
                let last = self.functions.len() - 1;
                Ok(&mut self.functions[last])
            }
        }
    }

    /// Add a string constant, reusing an existing one with the same text.
    /// Returns the global's name.
    pub fn add_global_string(&mut self, value: &str) -> String {
        if let Some(global) = self.globals.iter().find(|g| g.value == value) {
            return global.name.clone();
        }
        let name = match self.globals.len() {
            0 => ".str".to_string(),
            n => format!(".str.{}", n),
        };
        self.globals.push(GlobalString {
            name: name.clone(),
            value: value.to_string(),
        });
        name
    }

    pub fn global_string(&self, name: &str) -> Option<&str> {
        self.globals
            .iter()
            .find(|g| g.name == name)
            .map(|g| g.value.as_str())
    }
}

fn escape_bytes(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        if (byte.is_ascii_graphic() && byte != b'"' && byte != b'\\') || byte == b' ' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("\\{:02X}", byte));
        }
    }
    out
}

impl fmt::Display for DeviceModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; ModuleID = '{}'", self.name)?;
        if let Some(triple) = &self.target_triple {
            writeln!(f, "target triple = \"{}\"", triple)?;
        }
        for global in &self.globals {
            writeln!(
                f,
                "@{} = private unnamed_addr constant [{} x i8] c\"{}\\00\"",
                global.name,
                global.value.len() + 1,
                escape_bytes(&global.value)
            )?;
        }
        for decl in &self.functions {
            writeln!(f, "{}", decl)?;
        }
        Ok(())
    }
}
