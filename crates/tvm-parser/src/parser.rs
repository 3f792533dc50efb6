//! Recursive-descent parser for the TVM textual module format (spec.md
//! §4.2 "TVM parser").
//!
//! Grounded directly on `Parser::parse_globals`/`parse_global_element`/
//! `parse_function_type`/`parse_root_expression` etc. in the original
//! `Tvm/Parser.cpp`; the production structure and 2-token lookahead
//! (`accept2`) are carried over verbatim, re-expressed against
//! [`LexerKernel`] instead of the original's hand-rolled token queue.

use std::sync::Arc;

use tvm_lexer::{
    LexerKernel, PhysicalLocation, Position, TvmKeyword, TvmToken, TvmTokenId, TvmTokenValue, TvmTokenizer,
};

use crate::ast::*;
use crate::error::ParseError;

pub struct Parser<'a> {
    kernel: LexerKernel<'a, TvmTokenizer>,
}

impl<'a> Parser<'a> {
    pub fn new(name: impl Into<Arc<str>>, source: &'a [u8]) -> Result<Self, ParseError> {
        let position = Position::new(name.into(), source);
        let kernel = LexerKernel::new(position, TvmTokenizer::new(), 2)?;
        Ok(Parser { kernel })
    }

    pub fn parse_module(&mut self) -> Result<Module, ParseError> {
        let mut globals = Vec::new();
        while self.kernel.peek().id != TvmTokenId::Eof {
            let (name, location) = self.expect_identifier()?;
            self.expect_char(b'=')?;
            let element = self.parse_global_element()?;
            self.expect_char(b';')?;
            globals.push(NamedGlobal {
                name,
                element,
                location,
            });
        }
        Ok(Module { globals })
    }

    fn parse_global_element(&mut self) -> Result<GlobalElement, ParseError> {
        if self.accept_keyword(TvmKeyword::Global)? {
            let constant = self.accept_keyword(TvmKeyword::Const)?;
            let linkage = self.parse_linkage()?;
            let ty = Box::new(self.parse_root_expression()?);
            let initializer = if self.reject_char(b';') {
                Some(Box::new(self.parse_root_expression()?))
            } else {
                None
            };
            return Ok(GlobalElement::GlobalVariable(GlobalVariable {
                constant,
                linkage,
                ty,
                initializer,
            }));
        }

        if self.accept_keyword(TvmKeyword::Define)? {
            let value = Box::new(self.parse_root_expression()?);
            return Ok(GlobalElement::GlobalDefine(GlobalDefine { value }));
        }

        if self.accept_keyword(TvmKeyword::Recursive)? {
            self.expect_char(b'(')?;
            let first = self.parse_parameter_list()?;
            let (phantom_params, params) = if self.accept_char(b'|')? {
                (first, self.parse_parameter_list()?)
            } else {
                (Vec::new(), first)
            };
            self.expect_char(b')')?;
            self.expect_char(b'>')?;
            let body = Box::new(self.parse_root_expression()?);
            return Ok(GlobalElement::RecursiveType(RecursiveType {
                phantom_params,
                params,
                body,
            }));
        }

        let linkage = self.parse_linkage()?;
        let function_type = self.parse_function_type()?;
        let blocks = if self.accept_char(b'{')? {
            let blocks = self.parse_function_body()?;
            self.expect_char(b'}')?;
            Some(blocks)
        } else {
            None
        };
        Ok(GlobalElement::Function(Function {
            linkage,
            function_type,
            blocks,
        }))
    }

    fn parse_linkage(&mut self) -> Result<Linkage, ParseError> {
        if self.accept_keyword(TvmKeyword::Local)? {
            Ok(Linkage::Local)
        } else if self.accept_keyword(TvmKeyword::Private)? {
            Ok(Linkage::Private)
        } else if self.accept_keyword(TvmKeyword::Odr)? {
            Ok(Linkage::Odr)
        } else if self.accept_keyword(TvmKeyword::Export)? {
            Ok(Linkage::Export)
        } else if self.accept_keyword(TvmKeyword::Import)? {
            Ok(Linkage::Import)
        } else {
            Ok(Linkage::default())
        }
    }

    fn parse_function_type(&mut self) -> Result<FunctionType, ParseError> {
        self.expect_keyword(TvmKeyword::Function)?;
        let calling_convention = if self.accept_keyword(TvmKeyword::CcC)? {
            CallingConvention::C
        } else {
            CallingConvention::default()
        };
        let sret = self.accept_keyword(TvmKeyword::Sret)?;
        self.expect_char(b'(')?;
        let first = self.parse_parameter_list()?;
        let (phantom_params, params) = if self.accept_char(b'|')? {
            (first, self.parse_parameter_list()?)
        } else {
            (Vec::new(), first)
        };
        self.expect_char(b')')?;
        self.expect_char(b'>')?;
        let result_attrs = self.parse_attribute_list()?;
        let result_type = Box::new(self.parse_root_expression()?);
        Ok(FunctionType {
            calling_convention,
            sret,
            phantom_params,
            params,
            result_attrs,
            result_type,
        })
    }

    fn parse_parameter_list(&mut self) -> Result<Vec<Param>, ParseError> {
        let mut params = Vec::new();
        if matches!(self.kernel.peek().id, TvmTokenId::Char(b')') | TvmTokenId::Char(b'|')) {
            return Ok(params);
        }
        loop {
            params.push(self.parse_parameter()?);
            if !self.accept_char(b',')? {
                break;
            }
        }
        Ok(params)
    }

    fn parse_parameter(&mut self) -> Result<Param, ParseError> {
        let location = self.kernel.peek().location.clone();
        let (name, attrs) = if self.kernel.accept2(&TvmTokenId::Identifier, &TvmTokenId::Char(b':'))? {
            let name = ident_value(self.kernel.value(1));
            (Some(name), self.parse_attribute_list()?)
        } else if self.accept_char(b':')? {
            (None, self.parse_attribute_list()?)
        } else {
            (None, ParamAttrs::default())
        };
        let ty = Box::new(self.parse_root_expression()?);
        Ok(Param {
            name,
            attrs,
            ty,
            location,
        })
    }

    fn parse_attribute_list(&mut self) -> Result<ParamAttrs, ParseError> {
        let mut attrs = ParamAttrs::default();
        loop {
            if self.accept_keyword(TvmKeyword::Byval)? {
                attrs.byval = true;
            } else if self.accept_keyword(TvmKeyword::Inreg)? {
                attrs.inreg = true;
            } else {
                break;
            }
        }
        Ok(attrs)
    }

    fn parse_function_body(&mut self) -> Result<Vec<Block>, ParseError> {
        let mut blocks = Vec::new();
        let mut name: Option<String> = None;
        let mut dominator: Option<String> = None;
        let mut landing_pad = false;
        loop {
            let location = self.kernel.peek().location.clone();
            let statements = self.parse_statement_list()?;
            blocks.push(Block {
                name: name.take(),
                dominator: dominator.take(),
                landing_pad,
                statements,
                location,
            });
            landing_pad = false;

            if !self.reject_char(b'}') {
                break;
            }

            if self.accept_keyword(TvmKeyword::LandingPad)? {
                landing_pad = true;
            } else {
                self.expect_keyword(TvmKeyword::Block)?;
            }
            let (block_name, _) = self.expect_identifier()?;
            name = Some(block_name);
            if self.accept_char(b'(')? {
                let (dom, _) = self.expect_identifier()?;
                dominator = Some(dom);
                self.expect_char(b')')?;
            }
            self.expect_char(b':')?;
        }
        Ok(blocks)
    }

    fn parse_statement_list(&mut self) -> Result<Vec<Statement>, ParseError> {
        let mut statements = Vec::new();
        loop {
            let id = self.kernel.peek().id.clone();
            if matches!(
                id,
                TvmTokenId::Char(b'}')
                    | TvmTokenId::Keyword(TvmKeyword::Block)
                    | TvmTokenId::Keyword(TvmKeyword::LandingPad)
            ) {
                break;
            }
            statements.push(self.parse_statement()?);
        }
        Ok(statements)
    }

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        let location = self.kernel.peek().location.clone();
        let name = if self.kernel.accept2(&TvmTokenId::Identifier, &TvmTokenId::Char(b'='))? {
            Some(ident_value(self.kernel.value(1)))
        } else {
            None
        };
        let expr = if self.accept_keyword(TvmKeyword::Phi)? {
            let ty = Box::new(self.parse_expression()?);
            self.expect_char(b':')?;
            let nodes = self.parse_phi_nodes()?;
            Expr::Phi {
                ty,
                nodes,
                location: location.clone(),
            }
        } else {
            self.parse_root_expression()?
        };
        self.expect_char(b';')?;
        Ok(Statement {
            name,
            expr,
            location,
        })
    }

    fn parse_phi_nodes(&mut self) -> Result<Vec<PhiNode>, ParseError> {
        let mut nodes = Vec::new();
        loop {
            let location = self.kernel.peek().location.clone();
            let predecessor = if self.kernel.accept2(&TvmTokenId::Identifier, &TvmTokenId::Char(b'>'))? {
                Some(ident_value(self.kernel.value(1)))
            } else {
                self.expect_char(b'>')?;
                None
            };
            let value = Box::new(self.parse_expression()?);
            nodes.push(PhiNode {
                predecessor,
                value,
                location,
            });
            if !self.accept_char(b',')? {
                break;
            }
        }
        Ok(nodes)
    }

    /// The general expression grammar entry: a call, an `exists`
    /// quantifier, a function type, or (falling through) a plain atom.
    /// Used everywhere a type or value expression can appear at top
    /// level (parameter types, global types/initializers, phi types,
    /// `define` bodies).
    fn parse_root_expression(&mut self) -> Result<Expr, ParseError> {
        let location = self.kernel.peek().location.clone();

        if self.peek_is_keyword(TvmKeyword::Exists) {
            self.kernel.accept()?;
            self.expect_char(b'(')?;
            let params = self.parse_parameter_list()?;
            self.expect_char(b')')?;
            self.expect_char(b'>')?;
            let body = Box::new(self.parse_expression()?);
            return Ok(Expr::Exists {
                params,
                body,
                location,
            });
        }

        if self.peek_is_keyword(TvmKeyword::Function) {
            let function_type = self.parse_function_type()?;
            return Ok(Expr::FunctionType(Box::new(function_type), location));
        }

        if self.kernel.peek().id == TvmTokenId::Operator {
            let operator = operator_value(self.kernel.peek());
            self.kernel.accept()?;
            let mut operands = Vec::new();
            while self.can_start_expression() {
                operands.push(self.parse_expression()?);
            }
            return Ok(Expr::Call {
                operator,
                operands,
                location,
            });
        }

        self.parse_expression()
    }

    /// The narrower atom grammar: a parenthesized root expression, a
    /// literal, a name, or a bare zero-arity operator. Used for call
    /// operands and anywhere only a single term (not a trailing operand
    /// run) is expected.
    fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        let location = self.kernel.peek().location.clone();

        if self.accept_char(b'(')? {
            let expr = self.parse_root_expression()?;
            self.expect_char(b')')?;
            return Ok(expr);
        }

        match self.kernel.peek().id.clone() {
            TvmTokenId::Number => {
                let value = match &self.kernel.peek().value {
                    TvmTokenValue::Number(b) => *b,
                    _ => unreachable!("Number token without a Number value"),
                };
                self.kernel.accept()?;
                Ok(Expr::IntLiteral {
                    width: value.width(),
                    signed: value.is_signed(),
                    value: Arc::new(value),
                    location,
                })
            }
            TvmTokenId::Identifier => {
                let name = ident_value(self.kernel.peek());
                self.kernel.accept()?;
                Ok(Expr::Name(name, location))
            }
            TvmTokenId::Operator => {
                let operator = operator_value(self.kernel.peek());
                self.kernel.accept()?;
                Ok(Expr::Call {
                    operator,
                    operands: Vec::new(),
                    location,
                })
            }
            _ => Err(self.unexpected(Some("an expression"))),
        }
    }

    fn can_start_expression(&self) -> bool {
        matches!(
            self.kernel.peek().id,
            TvmTokenId::Char(b'(') | TvmTokenId::Number | TvmTokenId::Identifier | TvmTokenId::Operator
        )
    }

    // --- token-level helpers -------------------------------------------------

    fn peek_is_keyword(&self, kw: TvmKeyword) -> bool {
        self.kernel.peek().id == TvmTokenId::Keyword(kw)
    }

    fn reject_char(&self, c: u8) -> bool {
        self.kernel.peek().id != TvmTokenId::Char(c)
    }

    fn accept_char(&mut self, c: u8) -> Result<bool, ParseError> {
        Ok(self.kernel.accept_if(&TvmTokenId::Char(c))?)
    }

    fn expect_char(&mut self, c: u8) -> Result<PhysicalLocation, ParseError> {
        let location = self.kernel.peek().location.clone();
        if self.accept_char(c)? {
            Ok(location)
        } else {
            Err(self.unexpected(Some(&format!("'{}'", c as char))))
        }
    }

    fn accept_keyword(&mut self, kw: TvmKeyword) -> Result<bool, ParseError> {
        Ok(self.kernel.accept_if(&TvmTokenId::Keyword(kw))?)
    }

    fn expect_keyword(&mut self, kw: TvmKeyword) -> Result<PhysicalLocation, ParseError> {
        let location = self.kernel.peek().location.clone();
        if self.accept_keyword(kw)? {
            Ok(location)
        } else {
            Err(self.unexpected(Some(&format!("{kw:?}"))))
        }
    }

    fn expect_identifier(&mut self) -> Result<(String, PhysicalLocation), ParseError> {
        let location = self.kernel.peek().location.clone();
        if self.kernel.peek().id == TvmTokenId::Identifier {
            let name = ident_value(self.kernel.peek());
            self.kernel.accept()?;
            Ok((name, location))
        } else {
            Err(self.unexpected(Some("an identifier")))
        }
    }

    fn unexpected(&self, expected: Option<&str>) -> ParseError {
        let token = self.kernel.peek();
        ParseError::UnexpectedToken {
            location: token.location.clone(),
            found: self.kernel.error_name(token),
            expected: expected.map(|s| s.to_string()),
        }
    }
}

fn ident_value(token: &TvmToken) -> String {
    match &token.value {
        TvmTokenValue::Ident(s) => s.clone(),
        _ => unreachable!("Identifier token without an Ident value"),
    }
}

fn operator_value(token: &TvmToken) -> String {
    match &token.value {
        TvmTokenValue::Operator(s) => s.clone(),
        _ => unreachable!("Operator token without an Operator value"),
    }
}

/// Parse a complete TVM textual module (spec.md §4.2 top-level entry
/// point).
pub fn parse_module(name: impl Into<Arc<str>>, source: &str) -> Result<Module, ParseError> {
    let mut parser = Parser::new(name, source.as_bytes())?;
    parser.parse_module()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_global_define() {
        let module = parse_module("t.tvm", "%x = define #ix10;").unwrap();
        assert_eq!(module.globals.len(), 1);
        assert_eq!(module.globals[0].name, "x");
        match &module.globals[0].element {
            GlobalElement::GlobalDefine(def) => match def.value.as_ref() {
                Expr::IntLiteral { value, .. } => assert_eq!(value.as_u128(), 16),
                other => panic!("expected int literal, got {other:?}"),
            },
            other => panic!("expected global define, got {other:?}"),
        }
    }

    #[test]
    fn parses_a_function_type_with_cc_c_and_sret() {
        let module = parse_module(
            "t.tvm",
            "%f = define function cc_c sret (%a : #i32) > #i32;",
        )
        .unwrap();
        match &module.globals[0].element {
            GlobalElement::GlobalDefine(def) => match def.value.as_ref() {
                Expr::FunctionType(ft, _) => {
                    assert_eq!(ft.calling_convention, CallingConvention::C);
                    assert!(ft.sret);
                    assert_eq!(ft.params.len(), 1);
                    assert_eq!(ft.params[0].name.as_deref(), Some("a"));
                }
                other => panic!("expected function type, got {other:?}"),
            },
            other => panic!("expected global define, got {other:?}"),
        }
    }

    #[test]
    fn parses_a_function_with_blocks_and_phi() {
        let src = "\
            %f = export function (%a : #i32 | %b : #i32) > #i32 {\n\
                %r = add %a %b;\n\
                return %r;\n\
            block next:\n\
                %p = phi #i32 : entry > %a, next > %b;\n\
                return %p;\n\
            };";
        let module = parse_module("t.tvm", src).unwrap();
        match &module.globals[0].element {
            GlobalElement::Function(func) => {
                assert_eq!(func.linkage, Linkage::Export);
                assert_eq!(func.function_type.phantom_params.len(), 1);
                assert_eq!(func.function_type.params.len(), 1);
                let blocks = func.blocks.as_ref().unwrap();
                assert_eq!(blocks.len(), 2);
                assert!(blocks[0].name.is_none());
                assert_eq!(blocks[1].name.as_deref(), Some("next"));
                match &blocks[1].statements[0].expr {
                    Expr::Phi { nodes, .. } => assert_eq!(nodes.len(), 2),
                    other => panic!("expected phi, got {other:?}"),
                }
            }
            other => panic!("expected function, got {other:?}"),
        }
    }

    #[test]
    fn parses_recursive_type_with_phantom_params() {
        let module = parse_module(
            "t.tvm",
            "%list = recursive (%t | %n : #i32) > exists (%u : %t) > %u;",
        )
        .unwrap();
        match &module.globals[0].element {
            GlobalElement::RecursiveType(rec) => {
                assert_eq!(rec.phantom_params.len(), 1);
                assert_eq!(rec.params.len(), 1);
            }
            other => panic!("expected recursive type, got {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_input_with_location() {
        let err = parse_module("t.tvm", "%x = ;").unwrap_err();
        match err {
            ParseError::UnexpectedToken { .. } => {}
            other => panic!("expected unexpected-token error, got {other:?}"),
        }
    }
}
