//! Owned GLSL syntax tree.
//!
//! Nodes own their children; a node appears in exactly one place. The tree
//! carries enough structure to regenerate compilable source but performs no
//! semantic analysis: identifiers are plain strings and type names are not
//! resolved.

/// A complete translation unit.
#[derive(Clone, Debug, PartialEq)]
pub struct Tree {
    pub version: Version,
    /// Non-version directives kept verbatim (`extension`, `pragma`, ...),
    /// without the leading `#`.
    pub directives: Vec<String>,
    pub declarations: Vec<ExternalDecl>,
}

impl Tree {
    pub fn new(version: Version) -> Self {
        Self {
            version,
            directives: Vec::new(),
            declarations: Vec::new(),
        }
    }

    /// All function definitions and prototypes, in declaration order.
    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.declarations.iter().filter_map(|decl| match decl {
            ExternalDecl::Function(f) => Some(f),
            _ => None,
        })
    }

    /// Top-level variable and block declarations, in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &Declaration> {
        self.declarations.iter().filter_map(|decl| match decl {
            ExternalDecl::Declaration(d) => Some(d),
            _ => None,
        })
    }

    /// The definition of `main`, if present.
    pub fn main_function(&self) -> Option<&Function> {
        self.functions().find(|f| f.prototype.name == "main")
    }

    pub fn main_function_mut(&mut self) -> Option<&mut Function> {
        self.declarations.iter_mut().find_map(|decl| match decl {
            ExternalDecl::Function(f) if f.prototype.name == "main" => Some(f),
            _ => None,
        })
    }
}

/// `#version` header. Versions without an explicit profile keep `None` and
/// are written back without one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Version {
    pub number: u32,
    pub profile: Option<Profile>,
}

impl Default for Version {
    fn default() -> Self {
        Self {
            number: 110,
            profile: Some(Profile::Core),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Profile {
    Core,
    Compatibility,
    Es,
}

impl Profile {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Compatibility => "compatibility",
            Self::Es => "es",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExternalDecl {
    Declaration(Declaration),
    Function(Function),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Function {
    pub prototype: Prototype,
    /// `None` for a bare prototype.
    pub body: Option<Block>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Prototype {
    pub return_type: FullType,
    pub name: String,
    pub parameters: Vec<Parameter>,
}

/// Array suffixes written on the parameter name are folded into the type.
#[derive(Clone, Debug, PartialEq)]
pub struct Parameter {
    pub ty: FullType,
    pub name: Option<String>,
}

/// Type specifier plus leading qualifiers.
#[derive(Clone, Debug, PartialEq)]
pub struct FullType {
    pub qualifiers: Vec<Qualifier>,
    pub ty: TypeSpecifier,
}

impl FullType {
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            qualifiers: Vec::new(),
            ty: TypeSpecifier::named(name),
        }
    }

    pub fn storage(&self) -> Option<StorageQualifier> {
        self.qualifiers.iter().find_map(|q| match q {
            Qualifier::Storage(s) => Some(*s),
            _ => None,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Qualifier {
    Layout(Vec<LayoutItem>),
    Storage(StorageQualifier),
    Memory(MemoryQualifier),
    Interpolation(InterpolationQualifier),
    Precision(PrecisionQualifier),
    Invariant,
    Precise,
    Centroid,
    Patch,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LayoutItem {
    pub name: String,
    pub value: Option<Expr>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageQualifier {
    Const,
    In,
    Out,
    Inout,
    Uniform,
    Buffer,
    Shared,
    Attribute,
    Varying,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryQualifier {
    Coherent,
    Volatile,
    Restrict,
    Readonly,
    Writeonly,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterpolationQualifier {
    Flat,
    Smooth,
    Noperspective,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrecisionQualifier {
    High,
    Medium,
    Low,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypeSpecifier {
    pub name: TypeName,
    /// One entry per `[..]` suffix; `None` is an unsized dimension.
    pub arrays: Vec<Option<Expr>>,
}

impl TypeSpecifier {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: TypeName::Named(name.into()),
            arrays: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TypeName {
    Void,
    /// Built-in or user type referenced by name (`float`, `vec3`,
    /// `sampler2D`, `Light`, ...).
    Named(String),
    Struct(StructSpec),
}

#[derive(Clone, Debug, PartialEq)]
pub struct StructSpec {
    pub name: Option<String>,
    pub fields: Vec<StructField>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StructField {
    pub ty: FullType,
    pub declarators: Vec<Declarator>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Declarator {
    pub name: String,
    pub arrays: Vec<Option<Expr>>,
    pub init: Option<Expr>,
}

impl Declarator {
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arrays: Vec::new(),
            init: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Declaration {
    /// `const vec3 a = ..., b;` — also covers a lone struct definition
    /// (empty declarator list).
    Variable {
        ty: FullType,
        declarators: Vec<Declarator>,
    },
    /// `precision highp float;`
    Precision {
        precision: PrecisionQualifier,
        ty: TypeSpecifier,
    },
    /// Interface block: `uniform Camera { mat4 view; } camera;`
    Block {
        qualifiers: Vec<Qualifier>,
        name: String,
        fields: Vec<StructField>,
        instance: Option<Declarator>,
    },
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Block {
    pub statements: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    Declaration(Declaration),
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    For {
        init: Option<Box<Stmt>>,
        condition: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        condition: Expr,
    },
    Switch {
        selector: Expr,
        cases: Vec<SwitchCase>,
    },
    Return(Option<Expr>),
    Discard,
    Break,
    Continue,
    Compound(Block),
    Empty,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SwitchCase {
    pub label: CaseLabel,
    pub statements: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum CaseLabel {
    Case(Expr),
    Default,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    IntConstant { value: i64, unsigned: bool },
    FloatConstant(f64),
    BoolConstant(bool),
    Variable(String),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Assignment {
        op: AssignmentOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Ternary {
        condition: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Box<Expr>,
    },
    UnaryPrefix {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// `a++` / `a--`.
    UnaryPostfix {
        op: PostfixOp,
        operand: Box<Expr>,
    },
    /// Plain call; the callee is an expression so method-style calls like
    /// `a.length()` stay representable.
    Call {
        function: Box<Expr>,
        args: Vec<Expr>,
    },
    /// Type constructor, e.g. `vec3(1.0)` or `float[2](a, b)`.
    Constructor {
        ty: TypeSpecifier,
        args: Vec<Expr>,
    },
    Field {
        base: Box<Expr>,
        field: String,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    /// Comma operator.
    Sequence(Vec<Expr>),
}

impl Expr {
    pub fn variable(name: impl Into<String>) -> Self {
        Self::Variable(name.into())
    }

    pub fn int(value: i64) -> Self {
        Self::IntConstant {
            value,
            unsigned: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Multiply,
    Divide,
    Modulo,
    Add,
    Subtract,
    LeftShift,
    RightShift,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    Equal,
    NotEqual,
    BitAnd,
    BitXor,
    BitOr,
    LogicalAnd,
    LogicalXor,
    LogicalOr,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignmentOp {
    Assign,
    Multiply,
    Divide,
    Modulo,
    Add,
    Subtract,
    LeftShift,
    RightShift,
    And,
    Xor,
    Or,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    Not,
    BitNot,
    Increment,
    Decrement,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PostfixOp {
    Increment,
    Decrement,
}
