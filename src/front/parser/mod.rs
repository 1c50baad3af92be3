//! Backtracking recursive-descent GLSL parser.
//!
//! The parser works over the token vec with an explicit integer cursor.
//! Alternatives are tried by saving the cursor, attempting a parse and
//! restoring on failure. Failures record the deepest cursor reached plus a
//! message, so the error eventually reported points at the most specific
//! position, not at the first backtrack.

mod expr;
mod types;

use super::{
    ast::*,
    lexer::{tokenize, Token, TokenStream, TokenValue},
};
use crate::{error::SyntaxError, FastHashMap};

/// Parse failure sentinel. Carries no data; the reader tracks the deepest
/// error position and message.
pub(crate) struct Fail;

pub(crate) type PResult<T> = Result<T, Fail>;

/// A parsed translation unit plus the marker side table: marker comments
/// (`/* #name */`) mapped to the index of the top-level declaration that
/// follows them.
#[derive(Clone, Debug)]
pub struct ParseResult {
    pub tree: Tree,
    pub markers: FastHashMap<String, usize>,
}

/// Parses a full translation unit.
pub fn parse(source: &str) -> Result<ParseResult, SyntaxError> {
    let stream = tokenize(source);
    let mut parser = Parser {
        reader: TokenReader::new(source, &stream.tokens),
    };
    let mut tree = Tree::new(Version::default());
    let mut starts = Vec::new();

    while !parser.reader.at_end() {
        if let Some(TokenValue::Directive(text)) = parser.reader.peek() {
            let start = parser.reader.save();
            parser.reader.advance();
            if let Some(rest) = text.strip_prefix("version") {
                match parse_version(rest) {
                    Some(version) => tree.version = version,
                    None => {
                        parser.reader.restore(start);
                        let _: PResult<()> = parser.reader.fail("malformed #version directive");
                        return Err(parser.reader.into_syntax_error());
                    }
                }
            } else {
                tree.directives.push(text.clone());
            }
            continue;
        }
        if parser.reader.try_consume(&TokenValue::Semicolon) {
            continue;
        }
        let start = parser.reader.save();
        match parser.external_decl() {
            Ok(decl) => {
                starts.push(start);
                tree.declarations.push(decl);
            }
            Err(Fail) => return Err(parser.reader.into_syntax_error()),
        }
    }

    let markers = collect_markers(&stream, &starts);
    Ok(ParseResult { tree, markers })
}

/// Parses a translation unit, dropping the marker table.
pub fn parse_tree(source: &str) -> Result<Tree, SyntaxError> {
    parse(source).map(|r| r.tree)
}

/// Parses a bare sequence of external declarations (no `#version`
/// handling), as found in modifier fragments.
pub fn parse_fragment(source: &str) -> Result<Vec<ExternalDecl>, SyntaxError> {
    let stream = tokenize(source);
    let mut parser = Parser {
        reader: TokenReader::new(source, &stream.tokens),
    };
    let mut declarations = Vec::new();
    while !parser.reader.at_end() {
        if matches!(parser.reader.peek(), Some(TokenValue::Directive(_))) {
            parser.reader.advance();
            continue;
        }
        if parser.reader.try_consume(&TokenValue::Semicolon) {
            continue;
        }
        match parser.external_decl() {
            Ok(decl) => declarations.push(decl),
            Err(Fail) => return Err(parser.reader.into_syntax_error()),
        }
    }
    Ok(declarations)
}

fn parse_version(rest: &str) -> Option<Version> {
    let mut words = rest.split_whitespace();
    let number: u32 = words.next()?.parse().ok()?;
    let profile = match words.next() {
        None => None,
        Some("core") => Some(Profile::Core),
        Some("compatibility") => Some(Profile::Compatibility),
        Some("es") => Some(Profile::Es),
        Some(_) => return None,
    };
    if words.next().is_some() {
        return None;
    }
    Some(Version { number, profile })
}

fn collect_markers(stream: &TokenStream, starts: &[usize]) -> FastHashMap<String, usize> {
    let mut markers = FastHashMap::default();
    for comment in &stream.comments {
        if let Some(name) = marker_name(&comment.text) {
            if let Some(index) = starts.iter().position(|&s| s >= comment.next_token) {
                markers.insert(name, index);
            }
        }
    }
    markers
}

fn marker_name(text: &str) -> Option<String> {
    let body = if let Some(rest) = text.strip_prefix("//") {
        rest
    } else {
        let rest = text.strip_prefix("/*")?;
        rest.strip_suffix("*/").unwrap_or(rest)
    };
    let name = body.trim().strip_prefix('#')?.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

pub(crate) struct TokenReader<'a> {
    source: &'a str,
    tokens: &'a [Token],
    cursor: usize,
    error_cursor: usize,
    error_message: String,
}

impl<'a> TokenReader<'a> {
    fn new(source: &'a str, tokens: &'a [Token]) -> Self {
        Self {
            source,
            tokens,
            cursor: 0,
            error_cursor: 0,
            error_message: String::new(),
        }
    }

    pub fn peek(&self) -> Option<&'a TokenValue> {
        self.peek_at(0)
    }

    pub fn peek_at(&self, ahead: usize) -> Option<&'a TokenValue> {
        self.tokens.get(self.cursor + ahead).map(|t| &t.value)
    }

    pub fn advance(&mut self) {
        self.cursor += 1;
    }

    pub fn at_end(&self) -> bool {
        self.cursor >= self.tokens.len()
    }

    pub fn save(&self) -> usize {
        self.cursor
    }

    pub fn restore(&mut self, cursor: usize) {
        self.cursor = cursor;
    }

    pub fn try_consume(&mut self, value: &TokenValue) -> bool {
        if self.peek() == Some(value) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub fn expect(&mut self, value: &TokenValue) -> PResult<()> {
        if self.try_consume(value) {
            Ok(())
        } else {
            self.fail(format!("expected {}", describe(value)))
        }
    }

    pub fn consume_ident(&mut self) -> PResult<String> {
        match self.peek() {
            Some(TokenValue::Identifier(name)) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => self.fail("expected identifier"),
        }
    }

    /// Records the failure if it is the deepest seen so far.
    pub fn fail<T>(&mut self, message: impl Into<String>) -> PResult<T> {
        if self.cursor >= self.error_cursor {
            self.error_cursor = self.cursor;
            self.error_message = message.into();
        }
        Err(Fail)
    }

    fn into_syntax_error(self) -> SyntaxError {
        let offset = self
            .tokens
            .get(self.error_cursor)
            .map_or(self.source.len(), |t| t.start);
        let message = if self.error_message.is_empty() {
            "unexpected end of input".to_string()
        } else {
            self.error_message
        };
        SyntaxError::new(message, self.source, offset)
    }
}

fn describe(value: &TokenValue) -> String {
    let text = match value {
        TokenValue::Identifier(name) => return format!("'{name}'"),
        TokenValue::LeftParen => "(",
        TokenValue::RightParen => ")",
        TokenValue::LeftBracket => "[",
        TokenValue::RightBracket => "]",
        TokenValue::LeftBrace => "{",
        TokenValue::RightBrace => "}",
        TokenValue::Comma => ",",
        TokenValue::Semicolon => ";",
        TokenValue::Colon => ":",
        TokenValue::Assign => "=",
        TokenValue::While => "while",
        other => return format!("{other:?}"),
    };
    format!("'{text}'")
}

pub(crate) struct Parser<'a> {
    reader: TokenReader<'a>,
}

impl Parser<'_> {
    fn external_decl(&mut self) -> PResult<ExternalDecl> {
        let save = self.reader.save();
        match self.function() {
            Ok(function) => return Ok(ExternalDecl::Function(function)),
            Err(Fail) => self.reader.restore(save),
        }
        self.declaration().map(ExternalDecl::Declaration)
    }

    fn function(&mut self) -> PResult<Function> {
        use TokenValue as Tv;
        let return_type = self.full_type()?;
        let name = self.reader.consume_ident()?;
        self.reader.expect(&Tv::LeftParen)?;

        let mut parameters = Vec::new();
        if !self.reader.try_consume(&Tv::RightParen) {
            if self.reader.peek() == Some(&Tv::Void)
                && self.reader.peek_at(1) == Some(&Tv::RightParen)
            {
                self.reader.advance();
                self.reader.advance();
            } else {
                loop {
                    parameters.push(self.parameter()?);
                    if self.reader.try_consume(&Tv::Comma) {
                        continue;
                    }
                    self.reader.expect(&Tv::RightParen)?;
                    break;
                }
            }
        }

        let prototype = Prototype {
            return_type,
            name,
            parameters,
        };
        if self.reader.try_consume(&Tv::Semicolon) {
            return Ok(Function {
                prototype,
                body: None,
            });
        }
        self.reader.expect(&Tv::LeftBrace)?;
        let body = self.block_rest()?;
        Ok(Function {
            prototype,
            body: Some(body),
        })
    }

    fn parameter(&mut self) -> PResult<Parameter> {
        let mut ty = self.full_type()?;
        let name = match self.reader.peek() {
            Some(TokenValue::Identifier(_)) => {
                let name = self.reader.consume_ident()?;
                // array suffix on the name folds into the type
                let mut arrays = self.array_suffixes()?;
                ty.ty.arrays.append(&mut arrays);
                Some(name)
            }
            _ => None,
        };
        Ok(Parameter { ty, name })
    }

    pub(crate) fn declaration(&mut self) -> PResult<Declaration> {
        use TokenValue as Tv;
        if self.reader.try_consume(&Tv::Precision) {
            let precision = self.precision_qualifier()?;
            let ty = self.type_specifier()?;
            self.reader.expect(&Tv::Semicolon)?;
            return Ok(Declaration::Precision { precision, ty });
        }

        let qualifiers = self.qualifiers()?;
        if !qualifiers.is_empty()
            && matches!(self.reader.peek(), Some(Tv::Identifier(_)))
            && self.reader.peek_at(1) == Some(&Tv::LeftBrace)
        {
            return self.interface_block(qualifiers);
        }

        let ty = FullType {
            qualifiers,
            ty: self.type_specifier()?,
        };
        if self.reader.try_consume(&Tv::Semicolon) {
            // lone struct definition or bare qualifier declaration
            return Ok(Declaration::Variable {
                ty,
                declarators: Vec::new(),
            });
        }

        let mut declarators = Vec::new();
        loop {
            let name = self.reader.consume_ident()?;
            let arrays = self.array_suffixes()?;
            let init = if self.reader.try_consume(&Tv::Assign) {
                Some(self.assignment()?)
            } else {
                None
            };
            declarators.push(Declarator { name, arrays, init });
            if self.reader.try_consume(&Tv::Comma) {
                continue;
            }
            self.reader.expect(&Tv::Semicolon)?;
            break;
        }
        Ok(Declaration::Variable { ty, declarators })
    }

    fn interface_block(&mut self, qualifiers: Vec<Qualifier>) -> PResult<Declaration> {
        use TokenValue as Tv;
        let name = self.reader.consume_ident()?;
        self.reader.expect(&Tv::LeftBrace)?;
        let fields = self.struct_fields()?;
        let instance = match self.reader.peek() {
            Some(Tv::Identifier(_)) => {
                let name = self.reader.consume_ident()?;
                let arrays = self.array_suffixes()?;
                Some(Declarator {
                    name,
                    arrays,
                    init: None,
                })
            }
            _ => None,
        };
        self.reader.expect(&Tv::Semicolon)?;
        Ok(Declaration::Block {
            qualifiers,
            name,
            fields,
            instance,
        })
    }

    /// Parses statements up to and including the closing brace.
    fn block_rest(&mut self) -> PResult<Block> {
        let mut statements = Vec::new();
        while !self.reader.try_consume(&TokenValue::RightBrace) {
            if self.reader.at_end() {
                return self.reader.fail("expected '}'");
            }
            statements.push(self.statement()?);
        }
        Ok(Block { statements })
    }

    fn statement(&mut self) -> PResult<Stmt> {
        use TokenValue as Tv;
        match self.reader.peek() {
            Some(Tv::LeftBrace) => {
                self.reader.advance();
                Ok(Stmt::Compound(self.block_rest()?))
            }
            Some(Tv::If) => self.if_statement(),
            Some(Tv::For) => self.for_statement(),
            Some(Tv::While) => self.while_statement(),
            Some(Tv::Do) => self.do_statement(),
            Some(Tv::Switch) => self.switch_statement(),
            Some(Tv::Return) => {
                self.reader.advance();
                if self.reader.try_consume(&Tv::Semicolon) {
                    return Ok(Stmt::Return(None));
                }
                let value = self.expression()?;
                self.reader.expect(&Tv::Semicolon)?;
                Ok(Stmt::Return(Some(value)))
            }
            Some(Tv::Discard) => self.terminated(Stmt::Discard),
            Some(Tv::Break) => self.terminated(Stmt::Break),
            Some(Tv::Continue) => self.terminated(Stmt::Continue),
            Some(Tv::Semicolon) => {
                self.reader.advance();
                Ok(Stmt::Empty)
            }
            _ => {
                // declaration first, expression statement on failure
                let save = self.reader.save();
                match self.declaration() {
                    Ok(declaration) => return Ok(Stmt::Declaration(declaration)),
                    Err(Fail) => self.reader.restore(save),
                }
                let expr = self.expression()?;
                self.reader.expect(&Tv::Semicolon)?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn terminated(&mut self, statement: Stmt) -> PResult<Stmt> {
        self.reader.advance();
        self.reader.expect(&TokenValue::Semicolon)?;
        Ok(statement)
    }

    fn if_statement(&mut self) -> PResult<Stmt> {
        use TokenValue as Tv;
        self.reader.advance();
        self.reader.expect(&Tv::LeftParen)?;
        let condition = self.expression()?;
        self.reader.expect(&Tv::RightParen)?;
        let then_branch = Box::new(self.statement()?);
        // `else` binds to the nearest `if`
        let else_branch = if self.reader.try_consume(&Tv::Else) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn for_statement(&mut self) -> PResult<Stmt> {
        use TokenValue as Tv;
        self.reader.advance();
        self.reader.expect(&Tv::LeftParen)?;

        let init = if self.reader.try_consume(&Tv::Semicolon) {
            None
        } else {
            let save = self.reader.save();
            match self.declaration() {
                Ok(declaration) => Some(Box::new(Stmt::Declaration(declaration))),
                Err(Fail) => {
                    self.reader.restore(save);
                    let expr = self.expression()?;
                    self.reader.expect(&Tv::Semicolon)?;
                    Some(Box::new(Stmt::Expr(expr)))
                }
            }
        };

        let condition = if self.reader.peek() == Some(&Tv::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.reader.expect(&Tv::Semicolon)?;

        let update = if self.reader.peek() == Some(&Tv::RightParen) {
            None
        } else {
            Some(self.expression()?)
        };
        self.reader.expect(&Tv::RightParen)?;

        let body = Box::new(self.statement()?);
        Ok(Stmt::For {
            init,
            condition,
            update,
            body,
        })
    }

    fn while_statement(&mut self) -> PResult<Stmt> {
        use TokenValue as Tv;
        self.reader.advance();
        self.reader.expect(&Tv::LeftParen)?;
        let condition = self.expression()?;
        self.reader.expect(&Tv::RightParen)?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::While { condition, body })
    }

    fn do_statement(&mut self) -> PResult<Stmt> {
        use TokenValue as Tv;
        self.reader.advance();
        let body = Box::new(self.statement()?);
        self.reader.expect(&Tv::While)?;
        self.reader.expect(&Tv::LeftParen)?;
        let condition = self.expression()?;
        self.reader.expect(&Tv::RightParen)?;
        self.reader.expect(&Tv::Semicolon)?;
        Ok(Stmt::DoWhile { body, condition })
    }

    fn switch_statement(&mut self) -> PResult<Stmt> {
        use TokenValue as Tv;
        self.reader.advance();
        self.reader.expect(&Tv::LeftParen)?;
        let selector = self.expression()?;
        self.reader.expect(&Tv::RightParen)?;
        self.reader.expect(&Tv::LeftBrace)?;

        let mut cases = Vec::new();
        while !self.reader.try_consume(&Tv::RightBrace) {
            let label = if self.reader.try_consume(&Tv::Case) {
                let value = self.expression()?;
                CaseLabel::Case(value)
            } else if self.reader.try_consume(&Tv::Default) {
                CaseLabel::Default
            } else {
                return self.reader.fail("expected 'case', 'default' or '}'");
            };
            self.reader.expect(&Tv::Colon)?;

            let mut statements = Vec::new();
            while !matches!(
                self.reader.peek(),
                None | Some(Tv::Case | Tv::Default | Tv::RightBrace)
            ) {
                statements.push(self.statement()?);
            }
            cases.push(SwitchCase { label, statements });
        }
        Ok(Stmt::Switch { selector, cases })
    }
}

#[cfg(test)]
mod tests {
    use super::super::ast::*;
    use super::{parse, parse_fragment, parse_tree};

    #[test]
    fn version_and_directives() {
        let tree = parse_tree(
            "#version 430 core\n#extension GL_ARB_compute_shader : enable\nvoid main() {}\n",
        )
        .unwrap();
        assert_eq!(
            tree.version,
            Version {
                number: 430,
                profile: Some(Profile::Core)
            }
        );
        assert_eq!(
            tree.directives,
            vec!["extension GL_ARB_compute_shader : enable".to_string()]
        );
        assert!(tree.main_function().is_some());
    }

    #[test]
    fn missing_version_defaults() {
        let tree = parse_tree("void main() {}").unwrap();
        assert_eq!(tree.version, Version::default());
        assert_eq!(tree.version.number, 110);
    }

    #[test]
    fn declaration_vs_expression_statement() {
        let tree = parse_tree("void main() { vec3 a = b * c; a * b; }").unwrap();
        let main = tree.main_function().unwrap();
        let body = main.body.as_ref().unwrap();
        assert!(matches!(body.statements[0], Stmt::Declaration(_)));
        assert!(matches!(
            body.statements[1],
            Stmt::Expr(Expr::Binary {
                op: BinaryOp::Multiply,
                ..
            })
        ));
    }

    #[test]
    fn dangling_else_binds_nearest() {
        let tree = parse_tree("void main() { if (a) if (b) x = 1; else x = 2; }").unwrap();
        let main = tree.main_function().unwrap();
        let body = main.body.as_ref().unwrap();
        match &body.statements[0] {
            Stmt::If {
                then_branch,
                else_branch,
                ..
            } => {
                assert!(else_branch.is_none());
                assert!(matches!(
                    **then_branch,
                    Stmt::If {
                        else_branch: Some(_),
                        ..
                    }
                ));
            }
            other => panic!("expected if, got {other:?}"),
        }
    }

    #[test]
    fn constructor_vs_call() {
        let tree = parse_tree("void main() { a = vec3(1.0); b = foo(1.0); }").unwrap();
        let main = tree.main_function().unwrap();
        let body = main.body.as_ref().unwrap();
        let value_of = |s: &Stmt| match s {
            Stmt::Expr(Expr::Assignment { value, .. }) => (**value).clone(),
            other => panic!("expected assignment, got {other:?}"),
        };
        assert!(matches!(
            value_of(&body.statements[0]),
            Expr::Constructor { .. }
        ));
        assert!(matches!(value_of(&body.statements[1]), Expr::Call { .. }));
    }

    #[test]
    fn array_suffix_on_either_side() {
        let tree = parse_tree("uniform float a[4]; uniform float[4] b;").unwrap();
        for decl in tree.fields() {
            match decl {
                Declaration::Variable { ty, declarators } => {
                    let total =
                        ty.ty.arrays.len() + declarators.iter().map(|d| d.arrays.len()).sum::<usize>();
                    assert_eq!(total, 1);
                }
                other => panic!("expected variable, got {other:?}"),
            }
        }
    }

    #[test]
    fn interface_block() {
        let tree =
            parse_tree("layout(std140) uniform Camera { mat4 view; mat4 projection; } camera;")
                .unwrap();
        match &tree.declarations[0] {
            ExternalDecl::Declaration(Declaration::Block {
                name,
                fields,
                instance,
                ..
            }) => {
                assert_eq!(name, "Camera");
                assert_eq!(fields.len(), 2);
                assert_eq!(instance.as_ref().unwrap().name, "camera");
            }
            other => panic!("expected block, got {other:?}"),
        }
    }

    #[test]
    fn markers_attach_to_following_declaration() {
        let result = parse(
            "#version 330\nuniform vec4 color;\n/* #lights */\nuniform int lightCount;\nvoid main() {}\n",
        )
        .unwrap();
        assert_eq!(result.markers.get("lights"), Some(&1));
        assert!(matches!(
            result.tree.declarations[1],
            ExternalDecl::Declaration(Declaration::Variable { .. })
        ));
    }

    #[test]
    fn error_has_context_window() {
        let err = parse_tree("void main() { float x = ; }").unwrap_err();
        let text = err.to_string();
        assert!(text.contains('^'), "no caret in: {text}");
        assert!(text.lines().count() >= 3);
    }

    #[test]
    fn stray_semicolons_are_skipped() {
        let tree = parse_tree(";;void main() {};").unwrap();
        assert_eq!(tree.declarations.len(), 1);
    }

    #[test]
    fn fragment_parses_without_version() {
        let decls = parse_fragment("out vec4 extraColor;\nvoid helper() {}\n").unwrap();
        assert_eq!(decls.len(), 2);
    }
}
