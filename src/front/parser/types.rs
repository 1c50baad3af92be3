//! Qualifier and type-specifier parsing.

use super::{
    super::ast::*,
    super::lexer::TokenValue,
    {Parser, PResult},
};

impl Parser<'_> {
    /// Zero or more declaration qualifiers, in source order.
    pub(crate) fn qualifiers(&mut self) -> PResult<Vec<Qualifier>> {
        use TokenValue as Tv;
        let mut qualifiers = Vec::new();
        loop {
            let qualifier = match self.reader.peek() {
                Some(Tv::Layout) => {
                    self.reader.advance();
                    Qualifier::Layout(self.layout_items()?)
                }
                Some(Tv::Const) => Qualifier::Storage(StorageQualifier::Const),
                Some(Tv::In) => Qualifier::Storage(StorageQualifier::In),
                Some(Tv::Out) => Qualifier::Storage(StorageQualifier::Out),
                Some(Tv::Inout) => Qualifier::Storage(StorageQualifier::Inout),
                Some(Tv::Uniform) => Qualifier::Storage(StorageQualifier::Uniform),
                Some(Tv::Buffer) => Qualifier::Storage(StorageQualifier::Buffer),
                Some(Tv::Shared) => Qualifier::Storage(StorageQualifier::Shared),
                Some(Tv::Attribute) => Qualifier::Storage(StorageQualifier::Attribute),
                Some(Tv::Varying) => Qualifier::Storage(StorageQualifier::Varying),
                Some(Tv::Coherent) => Qualifier::Memory(MemoryQualifier::Coherent),
                Some(Tv::Volatile) => Qualifier::Memory(MemoryQualifier::Volatile),
                Some(Tv::Restrict) => Qualifier::Memory(MemoryQualifier::Restrict),
                Some(Tv::Readonly) => Qualifier::Memory(MemoryQualifier::Readonly),
                Some(Tv::Writeonly) => Qualifier::Memory(MemoryQualifier::Writeonly),
                Some(Tv::Flat) => Qualifier::Interpolation(InterpolationQualifier::Flat),
                Some(Tv::Smooth) => Qualifier::Interpolation(InterpolationQualifier::Smooth),
                Some(Tv::Noperspective) => {
                    Qualifier::Interpolation(InterpolationQualifier::Noperspective)
                }
                Some(Tv::HighP) => Qualifier::Precision(PrecisionQualifier::High),
                Some(Tv::MediumP) => Qualifier::Precision(PrecisionQualifier::Medium),
                Some(Tv::LowP) => Qualifier::Precision(PrecisionQualifier::Low),
                Some(Tv::Invariant) => Qualifier::Invariant,
                Some(Tv::Precise) => Qualifier::Precise,
                Some(Tv::Centroid) => Qualifier::Centroid,
                Some(Tv::Patch) => Qualifier::Patch,
                _ => break,
            };
            if !matches!(qualifier, Qualifier::Layout(_)) {
                self.reader.advance();
            }
            qualifiers.push(qualifier);
        }
        Ok(qualifiers)
    }

    fn layout_items(&mut self) -> PResult<Vec<LayoutItem>> {
        use TokenValue as Tv;
        self.reader.expect(&Tv::LeftParen)?;
        let mut items = Vec::new();
        loop {
            // `shared` doubles as a layout identifier
            let name = if self.reader.try_consume(&Tv::Shared) {
                "shared".to_string()
            } else {
                self.reader.consume_ident()?
            };
            let value = if self.reader.try_consume(&Tv::Assign) {
                Some(self.conditional()?)
            } else {
                None
            };
            items.push(LayoutItem { name, value });
            if self.reader.try_consume(&Tv::Comma) {
                continue;
            }
            self.reader.expect(&Tv::RightParen)?;
            break;
        }
        Ok(items)
    }

    pub(crate) fn full_type(&mut self) -> PResult<FullType> {
        let qualifiers = self.qualifiers()?;
        let ty = self.type_specifier()?;
        Ok(FullType { qualifiers, ty })
    }

    pub(crate) fn type_specifier(&mut self) -> PResult<TypeSpecifier> {
        use TokenValue as Tv;
        let name = match self.reader.peek() {
            Some(Tv::Void) => {
                self.reader.advance();
                TypeName::Void
            }
            Some(Tv::Struct) => TypeName::Struct(self.struct_spec()?),
            Some(Tv::Identifier(name)) => {
                let name = name.clone();
                self.reader.advance();
                TypeName::Named(name)
            }
            _ => return self.reader.fail("expected type"),
        };
        let arrays = self.array_suffixes()?;
        Ok(TypeSpecifier { name, arrays })
    }

    fn struct_spec(&mut self) -> PResult<StructSpec> {
        use TokenValue as Tv;
        self.reader.expect(&Tv::Struct)?;
        let name = match self.reader.peek() {
            Some(Tv::Identifier(_)) => Some(self.reader.consume_ident()?),
            _ => None,
        };
        self.reader.expect(&Tv::LeftBrace)?;
        let fields = self.struct_fields()?;
        Ok(StructSpec { name, fields })
    }

    /// Member declarations up to and including the closing brace.
    pub(crate) fn struct_fields(&mut self) -> PResult<Vec<StructField>> {
        use TokenValue as Tv;
        let mut fields = Vec::new();
        while !self.reader.try_consume(&Tv::RightBrace) {
            if self.reader.at_end() {
                return self.reader.fail("expected '}'");
            }
            let ty = self.full_type()?;
            let mut declarators = Vec::new();
            loop {
                let name = self.reader.consume_ident()?;
                let arrays = self.array_suffixes()?;
                declarators.push(Declarator {
                    name,
                    arrays,
                    init: None,
                });
                if self.reader.try_consume(&Tv::Comma) {
                    continue;
                }
                self.reader.expect(&Tv::Semicolon)?;
                break;
            }
            fields.push(StructField { ty, declarators });
        }
        Ok(fields)
    }

    /// Zero or more `[expr]` / `[]` suffixes.
    pub(crate) fn array_suffixes(&mut self) -> PResult<Vec<Option<Expr>>> {
        use TokenValue as Tv;
        let mut arrays = Vec::new();
        while self.reader.try_consume(&Tv::LeftBracket) {
            if self.reader.try_consume(&Tv::RightBracket) {
                arrays.push(None);
                continue;
            }
            let size = self.conditional()?;
            self.reader.expect(&Tv::RightBracket)?;
            arrays.push(Some(size));
        }
        Ok(arrays)
    }

    pub(crate) fn precision_qualifier(&mut self) -> PResult<PrecisionQualifier> {
        use TokenValue as Tv;
        let precision = match self.reader.peek() {
            Some(Tv::HighP) => PrecisionQualifier::High,
            Some(Tv::MediumP) => PrecisionQualifier::Medium,
            Some(Tv::LowP) => PrecisionQualifier::Low,
            _ => return self.reader.fail("expected precision qualifier"),
        };
        self.reader.advance();
        Ok(precision)
    }
}

/// True for type names that form constructor expressions. User struct
/// constructors parse as plain calls, which regenerates identically.
pub(crate) fn is_builtin_type(name: &str) -> bool {
    if matches!(name, "float" | "double" | "int" | "uint" | "bool") {
        return true;
    }
    let vector = |prefix: &str| {
        name.strip_prefix(prefix)
            .is_some_and(|rest| matches!(rest, "2" | "3" | "4"))
    };
    if vector("vec") || vector("ivec") || vector("uvec") || vector("bvec") || vector("dvec") {
        return true;
    }
    let matrix = |prefix: &str| match name.strip_prefix(prefix) {
        Some(rest) => matches!(
            rest,
            "2" | "3"
                | "4"
                | "2x2"
                | "2x3"
                | "2x4"
                | "3x2"
                | "3x3"
                | "3x4"
                | "4x2"
                | "4x3"
                | "4x4"
        ),
        None => false,
    };
    matrix("mat") || matrix("dmat")
}
