//! Regenerates compilable GLSL text from a syntax tree.
//!
//! The writer makes no attempt to reproduce the original formatting: tokens
//! are separated by single spaces, statements by newlines, blocks indented
//! with four spaces. The output is only required to re-parse to a
//! structurally equal tree.

use super::ast::*;
use std::fmt::Write as _;

/// Renders a full translation unit, `#version` line first.
pub fn write_tree(tree: &Tree) -> String {
    let mut writer = Writer::default();
    writer.tree(tree);
    writer.out
}

/// Renders a single expression, mostly useful for diagnostics.
pub fn write_expr(expr: &Expr) -> String {
    let mut writer = Writer::default();
    writer.expr(expr, 0);
    writer.out
}

#[derive(Default)]
struct Writer {
    out: String,
}

impl Writer {
    fn tree(&mut self, tree: &Tree) {
        let _ = write!(self.out, "#version {}", tree.version.number);
        if let Some(profile) = tree.version.profile {
            let _ = write!(self.out, " {}", profile.name());
        }
        self.out.push('\n');
        for directive in &tree.directives {
            let _ = writeln!(self.out, "#{directive}");
        }
        for decl in &tree.declarations {
            match decl {
                ExternalDecl::Declaration(declaration) => {
                    self.declaration(declaration, 0);
                    self.out.push('\n');
                }
                ExternalDecl::Function(function) => self.function(function),
            }
        }
    }

    fn function(&mut self, function: &Function) {
        self.full_type(&function.prototype.return_type);
        let _ = write!(self.out, " {}(", function.prototype.name);
        for (i, parameter) in function.prototype.parameters.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.full_type(&parameter.ty);
            if let Some(name) = &parameter.name {
                let _ = write!(self.out, " {name}");
            }
        }
        self.out.push(')');
        match &function.body {
            Some(body) => {
                self.out.push_str(" {\n");
                for statement in &body.statements {
                    self.statement(statement, 1);
                }
                self.out.push_str("}\n");
            }
            None => self.out.push_str(";\n"),
        }
    }

    fn declaration(&mut self, declaration: &Declaration, level: usize) {
        match declaration {
            Declaration::Variable { ty, declarators } => {
                self.full_type(ty);
                for (i, declarator) in declarators.iter().enumerate() {
                    self.out.push_str(if i > 0 { ", " } else { " " });
                    self.declarator(declarator);
                }
                self.out.push(';');
            }
            Declaration::Precision { precision, ty } => {
                let _ = write!(self.out, "precision {} ", precision_name(*precision));
                self.type_specifier(ty);
                self.out.push(';');
            }
            Declaration::Block {
                qualifiers,
                name,
                fields,
                instance,
            } => {
                self.qualifiers(qualifiers);
                let _ = write!(self.out, "{name} {{\n");
                self.struct_fields(fields, level + 1);
                self.indent(level);
                self.out.push('}');
                if let Some(instance) = instance {
                    self.out.push(' ');
                    self.declarator(instance);
                }
                self.out.push(';');
            }
        }
    }

    fn declarator(&mut self, declarator: &Declarator) {
        self.out.push_str(&declarator.name);
        self.array_suffixes(&declarator.arrays);
        if let Some(init) = &declarator.init {
            self.out.push_str(" = ");
            // assignment level, so a comma initializer needs parentheses
            self.expr(init, 1);
        }
    }

    fn full_type(&mut self, ty: &FullType) {
        self.qualifiers(&ty.qualifiers);
        self.type_specifier(&ty.ty);
    }

    fn qualifiers(&mut self, qualifiers: &[Qualifier]) {
        for qualifier in qualifiers {
            match qualifier {
                Qualifier::Layout(items) => {
                    self.out.push_str("layout(");
                    for (i, item) in items.iter().enumerate() {
                        if i > 0 {
                            self.out.push_str(", ");
                        }
                        self.out.push_str(&item.name);
                        if let Some(value) = &item.value {
                            self.out.push_str(" = ");
                            self.expr(value, 2);
                        }
                    }
                    self.out.push(')');
                }
                Qualifier::Storage(storage) => self.out.push_str(match storage {
                    StorageQualifier::Const => "const",
                    StorageQualifier::In => "in",
                    StorageQualifier::Out => "out",
                    StorageQualifier::Inout => "inout",
                    StorageQualifier::Uniform => "uniform",
                    StorageQualifier::Buffer => "buffer",
                    StorageQualifier::Shared => "shared",
                    StorageQualifier::Attribute => "attribute",
                    StorageQualifier::Varying => "varying",
                }),
                Qualifier::Memory(memory) => self.out.push_str(match memory {
                    MemoryQualifier::Coherent => "coherent",
                    MemoryQualifier::Volatile => "volatile",
                    MemoryQualifier::Restrict => "restrict",
                    MemoryQualifier::Readonly => "readonly",
                    MemoryQualifier::Writeonly => "writeonly",
                }),
                Qualifier::Interpolation(interpolation) => {
                    self.out.push_str(match interpolation {
                        InterpolationQualifier::Flat => "flat",
                        InterpolationQualifier::Smooth => "smooth",
                        InterpolationQualifier::Noperspective => "noperspective",
                    })
                }
                Qualifier::Precision(precision) => {
                    self.out.push_str(precision_name(*precision))
                }
                Qualifier::Invariant => self.out.push_str("invariant"),
                Qualifier::Precise => self.out.push_str("precise"),
                Qualifier::Centroid => self.out.push_str("centroid"),
                Qualifier::Patch => self.out.push_str("patch"),
            }
            self.out.push(' ');
        }
    }

    fn type_specifier(&mut self, ty: &TypeSpecifier) {
        match &ty.name {
            TypeName::Void => self.out.push_str("void"),
            TypeName::Named(name) => self.out.push_str(name),
            TypeName::Struct(spec) => {
                self.out.push_str("struct");
                if let Some(name) = &spec.name {
                    let _ = write!(self.out, " {name}");
                }
                self.out.push_str(" {\n");
                self.struct_fields(&spec.fields, 1);
                self.out.push('}');
            }
        }
        self.array_suffixes(&ty.arrays);
    }

    fn struct_fields(&mut self, fields: &[StructField], level: usize) {
        for field in fields {
            self.indent(level);
            self.full_type(&field.ty);
            for (i, declarator) in field.declarators.iter().enumerate() {
                self.out.push_str(if i > 0 { ", " } else { " " });
                self.out.push_str(&declarator.name);
                self.array_suffixes(&declarator.arrays);
            }
            self.out.push_str(";\n");
        }
    }

    fn array_suffixes(&mut self, arrays: &[Option<Expr>]) {
        for size in arrays {
            self.out.push('[');
            if let Some(size) = size {
                self.expr(size, 2);
            }
            self.out.push(']');
        }
    }

    fn statement(&mut self, statement: &Stmt, level: usize) {
        self.indent(level);
        self.statement_inline(statement, level);
        self.out.push('\n');
    }

    /// Writes a statement without leading indent or trailing newline, for
    /// positions like a `for` init or a single-statement branch body.
    fn statement_inline(&mut self, statement: &Stmt, level: usize) {
        match statement {
            Stmt::Expr(expr) => {
                self.expr(expr, 0);
                self.out.push(';');
            }
            Stmt::Declaration(declaration) => self.declaration(declaration, level),
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.out.push_str("if (");
                self.expr(condition, 0);
                self.out.push_str(") ");
                self.branch_body(then_branch, level);
                if let Some(else_branch) = else_branch {
                    self.out.push_str(" else ");
                    self.branch_body(else_branch, level);
                }
            }
            Stmt::For {
                init,
                condition,
                update,
                body,
            } => {
                self.out.push_str("for (");
                match init {
                    Some(init) => self.statement_inline(init, level),
                    None => self.out.push(';'),
                }
                if let Some(condition) = condition {
                    self.out.push(' ');
                    self.expr(condition, 0);
                }
                self.out.push(';');
                if let Some(update) = update {
                    self.out.push(' ');
                    self.expr(update, 0);
                }
                self.out.push_str(") ");
                self.branch_body(body, level);
            }
            Stmt::While { condition, body } => {
                self.out.push_str("while (");
                self.expr(condition, 0);
                self.out.push_str(") ");
                self.branch_body(body, level);
            }
            Stmt::DoWhile { body, condition } => {
                self.out.push_str("do ");
                self.branch_body(body, level);
                self.out.push_str(" while (");
                self.expr(condition, 0);
                self.out.push_str(");");
            }
            Stmt::Switch { selector, cases } => {
                self.out.push_str("switch (");
                self.expr(selector, 0);
                self.out.push_str(") {\n");
                for case in cases {
                    self.indent(level + 1);
                    match &case.label {
                        CaseLabel::Case(value) => {
                            self.out.push_str("case ");
                            self.expr(value, 0);
                            self.out.push_str(":\n");
                        }
                        CaseLabel::Default => self.out.push_str("default:\n"),
                    }
                    for statement in &case.statements {
                        self.statement(statement, level + 2);
                    }
                }
                self.indent(level);
                self.out.push('}');
            }
            Stmt::Return(value) => {
                self.out.push_str("return");
                if let Some(value) = value {
                    self.out.push(' ');
                    self.expr(value, 0);
                }
                self.out.push(';');
            }
            Stmt::Discard => self.out.push_str("discard;"),
            Stmt::Break => self.out.push_str("break;"),
            Stmt::Continue => self.out.push_str("continue;"),
            Stmt::Compound(block) => self.compound(block, level),
            Stmt::Empty => self.out.push(';'),
        }
    }

    /// A branch body; compounds stay on the same line, anything else moves
    /// to its own indented line.
    fn branch_body(&mut self, statement: &Stmt, level: usize) {
        match statement {
            Stmt::Compound(block) => self.compound(block, level),
            other => {
                self.out.push('\n');
                self.indent(level + 1);
                self.statement_inline(other, level + 1);
            }
        }
    }

    fn compound(&mut self, block: &Block, level: usize) {
        self.out.push_str("{\n");
        for statement in &block.statements {
            self.statement(statement, level + 1);
        }
        self.indent(level);
        self.out.push('}');
    }

    /// Writes `expr`, parenthesizing when its precedence falls below
    /// `min_prec` (the binding strength the context requires).
    fn expr(&mut self, expr: &Expr, min_prec: u8) {
        let prec = precedence(expr);
        if prec < min_prec {
            self.out.push('(');
            self.expr_inner(expr);
            self.out.push(')');
        } else {
            self.expr_inner(expr);
        }
    }

    fn expr_inner(&mut self, expr: &Expr) {
        match expr {
            &Expr::IntConstant { value, unsigned } => {
                let _ = write!(self.out, "{value}");
                if unsigned {
                    self.out.push('u');
                }
            }
            Expr::FloatConstant(value) => {
                // Debug formatting keeps the decimal point on whole values,
                // so the output re-lexes as a float
                let _ = write!(self.out, "{value:?}");
            }
            Expr::BoolConstant(value) => {
                let _ = write!(self.out, "{value}");
            }
            Expr::Variable(name) => self.out.push_str(name),
            Expr::Binary { op, left, right } => {
                let prec = binary_precedence(*op);
                self.expr(left, prec);
                let _ = write!(self.out, " {} ", binary_symbol(*op));
                self.expr(right, prec + 1);
            }
            Expr::Assignment { op, target, value } => {
                self.expr(target, PREC_UNARY);
                let _ = write!(self.out, " {} ", assignment_symbol(*op));
                self.expr(value, PREC_ASSIGN);
            }
            Expr::Ternary {
                condition,
                if_true,
                if_false,
            } => {
                self.expr(condition, PREC_TERNARY + 1);
                self.out.push_str(" ? ");
                self.expr(if_true, 0);
                self.out.push_str(" : ");
                self.expr(if_false, PREC_ASSIGN);
            }
            Expr::UnaryPrefix { op, operand } => {
                self.out.push_str(match op {
                    UnaryOp::Plus => "+",
                    UnaryOp::Minus => "-",
                    UnaryOp::Not => "!",
                    UnaryOp::BitNot => "~",
                    UnaryOp::Increment => "++",
                    UnaryOp::Decrement => "--",
                });
                self.expr(operand, PREC_UNARY);
            }
            Expr::UnaryPostfix { op, operand } => {
                self.expr(operand, PREC_POSTFIX);
                self.out.push_str(match op {
                    PostfixOp::Increment => "++",
                    PostfixOp::Decrement => "--",
                });
            }
            Expr::Call { function, args } => {
                self.expr(function, PREC_POSTFIX);
                self.args(args);
            }
            Expr::Constructor { ty, args } => {
                self.type_specifier(ty);
                self.args(args);
            }
            Expr::Field { base, field } => {
                self.expr(base, PREC_POSTFIX);
                let _ = write!(self.out, ".{field}");
            }
            Expr::Index { base, index } => {
                self.expr(base, PREC_POSTFIX);
                self.out.push('[');
                self.expr(index, 0);
                self.out.push(']');
            }
            Expr::Sequence(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.expr(item, PREC_ASSIGN);
                }
            }
        }
    }

    fn args(&mut self, args: &[Expr]) {
        self.out.push('(');
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.expr(arg, PREC_ASSIGN);
        }
        self.out.push(')');
    }

    fn indent(&mut self, level: usize) {
        for _ in 0..level {
            self.out.push_str("    ");
        }
    }
}

const PREC_ASSIGN: u8 = 1;
const PREC_TERNARY: u8 = 2;
const PREC_UNARY: u8 = 14;
const PREC_POSTFIX: u8 = 15;

fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Sequence(_) => 0,
        Expr::Assignment { .. } => PREC_ASSIGN,
        Expr::Ternary { .. } => PREC_TERNARY,
        Expr::Binary { op, .. } => binary_precedence(*op),
        Expr::UnaryPrefix { .. } => PREC_UNARY,
        Expr::UnaryPostfix { .. }
        | Expr::Call { .. }
        | Expr::Constructor { .. }
        | Expr::Field { .. }
        | Expr::Index { .. } => PREC_POSTFIX,
        _ => 16,
    }
}

fn binary_precedence(op: BinaryOp) -> u8 {
    use BinaryOp as Op;
    match op {
        Op::LogicalOr => 3,
        Op::LogicalXor => 4,
        Op::LogicalAnd => 5,
        Op::BitOr => 6,
        Op::BitXor => 7,
        Op::BitAnd => 8,
        Op::Equal | Op::NotEqual => 9,
        Op::Less | Op::Greater | Op::LessEqual | Op::GreaterEqual => 10,
        Op::LeftShift | Op::RightShift => 11,
        Op::Add | Op::Subtract => 12,
        Op::Multiply | Op::Divide | Op::Modulo => 13,
    }
}

fn binary_symbol(op: BinaryOp) -> &'static str {
    use BinaryOp as Op;
    match op {
        Op::Multiply => "*",
        Op::Divide => "/",
        Op::Modulo => "%",
        Op::Add => "+",
        Op::Subtract => "-",
        Op::LeftShift => "<<",
        Op::RightShift => ">>",
        Op::Less => "<",
        Op::Greater => ">",
        Op::LessEqual => "<=",
        Op::GreaterEqual => ">=",
        Op::Equal => "==",
        Op::NotEqual => "!=",
        Op::BitAnd => "&",
        Op::BitXor => "^",
        Op::BitOr => "|",
        Op::LogicalAnd => "&&",
        Op::LogicalXor => "^^",
        Op::LogicalOr => "||",
    }
}

fn assignment_symbol(op: AssignmentOp) -> &'static str {
    use AssignmentOp as Op;
    match op {
        Op::Assign => "=",
        Op::Multiply => "*=",
        Op::Divide => "/=",
        Op::Modulo => "%=",
        Op::Add => "+=",
        Op::Subtract => "-=",
        Op::LeftShift => "<<=",
        Op::RightShift => ">>=",
        Op::And => "&=",
        Op::Xor => "^=",
        Op::Or => "|=",
    }
}

fn precision_name(precision: PrecisionQualifier) -> &'static str {
    match precision {
        PrecisionQualifier::High => "highp",
        PrecisionQualifier::Medium => "mediump",
        PrecisionQualifier::Low => "lowp",
    }
}

#[cfg(test)]
mod tests {
    use super::super::parser::parse_tree;
    use super::write_tree;

    /// Asserts that rendering and re-parsing produces a structurally equal
    /// tree.
    fn round_trip(source: &str) {
        let tree = parse_tree(source).expect("first parse");
        let rendered = write_tree(&tree);
        let reparsed = parse_tree(&rendered)
            .unwrap_or_else(|e| panic!("rendered output failed to parse: {e}\n{rendered}"));
        assert_eq!(tree, reparsed, "round trip changed the tree:\n{rendered}");
    }

    #[test]
    fn round_trip_declarations() {
        round_trip("#version 450 core\nuniform vec4 color;\n");
        round_trip("const float PI = 3.14159, TAU = 6.28318;");
        round_trip("layout(location = 0) out vec4 fragColor;");
        round_trip("layout(std140, binding = 1) uniform Camera { mat4 view; mat4 proj; } cam;");
        round_trip("layout(std430) buffer Lights { vec4 positions[]; };");
        round_trip("struct Light { vec3 position; float intensity; };");
        round_trip("precision highp float;");
        round_trip("uniform float weights[4];");
        round_trip("uniform float[4] weights;");
        round_trip("flat in int instanceId;");
        round_trip("invariant centroid in vec2 uv;");
    }

    #[test]
    fn round_trip_statements() {
        round_trip(
            "void main() {\
             int x = 0;\
             if (x > 0) x = 1; else { x = 2; }\
             for (int i = 0; i < 4; i++) x += i;\
             for (;;) break;\
             while (x < 10) x *= 2;\
             do { x--; } while (x > 0);\
             switch (x) { case 0: x = 1; break; default: x = 2; }\
             { int y = x; }\
             ;\
             return;\
             }",
        );
        round_trip("void f() { discard; }");
        round_trip("int f(int a, float b) { return a; }");
        round_trip("float g(void);");
    }

    #[test]
    fn round_trip_expressions() {
        round_trip("void main() { x = a + b * c - d / e % f; }");
        round_trip("void main() { x = (a + b) * c; }");
        round_trip("void main() { x = a << 2 | b & 3 ^ c; }");
        round_trip("void main() { x = a < b && c >= d || !e; }");
        round_trip("void main() { x = a ? b : c ? d : e; }");
        round_trip("void main() { x = -a * ~b; }");
        round_trip("void main() { v = vec3(1.0, 2.0, 3.0).xyz; }");
        round_trip("void main() { m[2][3] = arr[i].field.len; }");
        round_trip("void main() { x = a.length(); }");
        round_trip("void main() { x += y, y -= z; }");
        round_trip("void main() { x = float[3](1.0, 2.0, 3.0)[1]; }");
        round_trip("void main() { a++; --b; }");
    }

    #[test]
    fn negative_unary_keeps_structure() {
        // -(a * b) must not render as -a * b
        round_trip("void main() { x = -(a * b); }");
        round_trip("void main() { x = (a + b).x; }");
    }

    #[test]
    fn floats_keep_decimal_point() {
        let tree = parse_tree("void main() { x = 2.0; }").unwrap();
        let rendered = write_tree(&tree);
        assert!(rendered.contains("2.0"), "{rendered}");
    }

    #[test]
    fn version_written_first() {
        let tree = parse_tree("#version 330\nvoid main() {}").unwrap();
        let rendered = write_tree(&tree);
        assert!(rendered.starts_with("#version 330\n"), "{rendered}");
    }
}
