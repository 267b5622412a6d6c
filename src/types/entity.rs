use crate::syntax::Span;
use std::collections::BTreeMap;
use std::fmt;

/// Inferred type of a value. MiniScript has no static types, so inference is
/// best-effort and `Any` is the common answer.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Type {
    #[default]
    Any,
    Null,
    Number,
    String,
    List(Box<Type>),
    Map(MapType),
    Function(Signature),
}

impl Type {
    pub fn is_any(&self) -> bool {
        matches!(self, Type::Any)
    }

    pub fn as_map(&self) -> Option<&MapType> {
        match self {
            Type::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut MapType> {
        match self {
            Type::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Type::Function(_))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Any => write!(f, "any"),
            Type::Null => write!(f, "null"),
            Type::Number => write!(f, "number"),
            Type::String => write!(f, "string"),
            Type::List(_) => write!(f, "list"),
            Type::Map(_) => write!(f, "map"),
            Type::Function(signature) => write!(f, "{signature}"),
        }
    }
}

/// A map value's known properties.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MapType {
    pub properties: BTreeMap<String, Entity>,
}

impl MapType {
    pub fn get(&self, name: &str) -> Option<&Entity> {
        self.properties.get(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterInfo {
    pub name: String,
    /// Type of the default value, if the parameter has one.
    pub default: Option<Type>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub parameters: Vec<ParameterInfo>,
    pub returns: Box<Type>,
}

impl Signature {
    pub fn new(parameters: Vec<ParameterInfo>, returns: Type) -> Self {
        Self {
            parameters,
            returns: Box::new(returns),
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "function(")?;
        for (i, parameter) in self.parameters.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match &parameter.default {
                Some(default) => write!(f, "{}: {default} = ...", parameter.name)?,
                None => write!(f, "{}", parameter.name)?,
            }
        }
        write!(f, ")")?;
        if !self.returns.is_any() {
            write!(f, " -> {}", self.returns)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Variable,
    Function,
    Parameter,
    Property,
    /// Alias introduced by an import; its type holds the imported exports.
    Namespace,
    /// Intrinsic provided by the runtime. Has no source location.
    Builtin,
}

impl EntityKind {
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Variable => "var",
            EntityKind::Function => "function",
            EntityKind::Parameter => "param",
            EntityKind::Property => "property",
            EntityKind::Namespace => "namespace",
            EntityKind::Builtin => "builtin",
        }
    }
}

/// Where an entity was assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub uri: String,
    pub span: Span,
}

/// A named value known to the type model.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub name: String,
    pub kind: EntityKind,
    pub ty: Type,
    /// Every assignment of this name, first one first.
    pub sources: Vec<SourceLocation>,
    pub documentation: Option<&'static str>,
}

impl Entity {
    pub fn new(name: impl Into<String>, kind: EntityKind, ty: Type) -> Self {
        Self {
            name: name.into(),
            kind,
            ty,
            sources: Vec::new(),
            documentation: None,
        }
    }

    /// An unnamed value produced while resolving an expression.
    pub fn anonymous(ty: Type) -> Self {
        Self::new("", EntityKind::Variable, ty)
    }

    pub fn with_source(mut self, uri: &str, span: Span) -> Self {
        self.sources.push(SourceLocation {
            uri: uri.to_string(),
            span,
        });
        self
    }

    /// The first assignment, if the entity comes from source code.
    pub fn declaration(&self) -> Option<&SourceLocation> {
        self.sources.first()
    }

    /// Add sources from another binding of the same name, skipping duplicates.
    pub fn absorb_sources(&mut self, other: &Entity) {
        for source in &other.sources {
            if !self.sources.contains(source) {
                self.sources.push(source.clone());
            }
        }
    }

    /// One-line description such as `function add(a, b) -> number`.
    pub fn signature_label(&self) -> String {
        match &self.ty {
            Type::Function(signature) => {
                let rendered = signature.to_string();
                let params = rendered.trim_start_matches("function");
                format!("({}) {}{}", self.kind.label(), self.name, params)
            }
            ty => format!("({}) {}: {ty}", self.kind.label(), self.name),
        }
    }
}
