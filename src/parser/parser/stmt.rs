//! Statement parsing (spec §4.2's statement grammar).

use super::guards::{LoopGuard, MAX_PARSE_DEPTH};
use super::pattern::{parse_param_list, parse_pattern};
use super::{ParseError, Parser};
use crate::parser::ast::*;
use crate::parser::interner::Symbol;
use crate::parser::token::{Span, Token};

pub fn parse_statement(parser: &mut Parser) -> Result<Statement, ParseError> {
    parser.depth += 1;
    if parser.depth > MAX_PARSE_DEPTH {
        parser.depth -= 1;
        return Err(ParseError::parser_limit_exceeded(
            format!("Maximum nesting depth ({}) exceeded in statement", MAX_PARSE_DEPTH),
            parser.current_span(),
        ));
    }
    let result = parse_statement_inner(parser);
    parser.depth -= 1;
    result
}

fn parse_statement_inner(parser: &mut Parser) -> Result<Statement, ParseError> {
    match parser.current() {
        Token::LeftBrace => Ok(Statement::Block(parse_block_statement(parser)?)),
        Token::Semicolon => {
            let span = parser.current_span();
            parser.advance();
            Ok(Statement::Empty(span))
        }
        Token::Var | Token::Let | Token::Const => Ok(Statement::VarDeclaration(parse_var_declaration(parser)?)),
        Token::Function => Ok(Statement::FunctionDeclaration(parse_function_declaration(parser, false)?)),
        Token::Class => Ok(Statement::ClassDeclaration(parse_class_declaration(parser)?)),
        Token::If => Ok(Statement::If(parse_if_statement(parser)?)),
        Token::For => parse_for_statement(parser),
        Token::While => Ok(Statement::While(parse_while_statement(parser)?)),
        Token::Do => Ok(Statement::DoWhile(parse_do_while_statement(parser)?)),
        Token::Return => Ok(Statement::Return(parse_return_statement(parser)?)),
        Token::Break => Ok(Statement::Break(parse_break_statement(parser)?)),
        Token::Continue => Ok(Statement::Continue(parse_continue_statement(parser)?)),
        Token::Throw => Ok(Statement::Throw(parse_throw_statement(parser)?)),
        Token::Try => Ok(Statement::Try(parse_try_statement(parser)?)),
        Token::Switch => Ok(Statement::Switch(parse_switch_statement(parser)?)),
        Token::Import => Ok(Statement::Import(parse_import_declaration(parser)?)),
        Token::Export => Ok(Statement::Export(parse_export_declaration(parser)?)),
        Token::Debugger => {
            let span = parser.current_span();
            parser.advance();
            parser.consume_semicolon()?;
            Ok(Statement::Debugger(span))
        }
        _ => {
            if parser.at_contextual("async") && matches!(parser.peek(), Some(Token::Function)) {
                parser.advance();
                return Ok(Statement::FunctionDeclaration(parse_function_declaration(parser, true)?));
            }
            parse_labeled_or_expression_statement(parser)
        }
    }
}

pub fn parse_block_statement(parser: &mut Parser) -> Result<BlockStatement, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::LeftBrace)?;
    let mut statements = Vec::new();
    let mut guard = LoopGuard::new("block_statement");
    while !parser.check(&Token::RightBrace) && !parser.at_eof() {
        guard.check()?;
        statements.push(parse_statement(parser)?);
    }
    let end = parser.current_span();
    parser.expect(Token::RightBrace)?;
    let span = parser.combine_spans(&start, &end);
    Ok(BlockStatement { statements, span })
}

fn parse_var_declaration(parser: &mut Parser) -> Result<VarDeclaration, ParseError> {
    let start = parser.current_span();
    let kind = match parser.current() {
        Token::Var => VarKind::Var,
        Token::Let => VarKind::Let,
        Token::Const => VarKind::Const,
        _ => unreachable!("caller already checked for var/let/const"),
    };
    parser.advance();

    let mut declarations = Vec::new();
    let mut guard = LoopGuard::new("var_declarators");
    loop {
        guard.check()?;
        let decl_start = parser.current_span();
        let name = parse_pattern(parser)?;
        let init = if parser.check(&Token::Equal) {
            parser.advance();
            Some(super::expr::parse_expression(parser)?)
        } else {
            None
        };
        if kind == VarKind::Const && init.is_none() {
            return Err(ParseError::invalid_syntax("missing initializer in const declaration", decl_start));
        }
        let end = init.as_ref().map(|e| e.span()).unwrap_or_else(|| name.span());
        let span = parser.combine_spans(&decl_start, &end);
        declarations.push(VarDeclarator { name, init, span });

        if parser.check(&Token::Comma) {
            parser.advance();
        } else {
            break;
        }
    }

    let end = declarations.last().unwrap().span;
    parser.consume_semicolon()?;
    let span = parser.combine_spans(&start, &end);
    Ok(VarDeclaration { kind, declarations, span })
}

/// Continues a `var`/`let`/`const` declaration whose keyword and first
/// pattern were already consumed while probing for a for-in/for-of loop.
fn parse_var_declaration_rest(
    parser: &mut Parser,
    kind: VarKind,
    decl_start: Span,
    first_pattern: Pattern,
) -> Result<VarDeclaration, ParseError> {
    let init = if parser.check(&Token::Equal) {
        parser.advance();
        Some(super::expr::parse_expression(parser)?)
    } else {
        None
    };
    let end = init.as_ref().map(|e| e.span()).unwrap_or_else(|| first_pattern.span());
    let first_span = parser.combine_spans(&decl_start, &end);
    let mut declarations = vec![VarDeclarator { name: first_pattern, init, span: first_span }];

    let mut guard = LoopGuard::new("for_var_declarators");
    while parser.check(&Token::Comma) {
        guard.check()?;
        parser.advance();
        let d_start = parser.current_span();
        let name = parse_pattern(parser)?;
        let init = if parser.check(&Token::Equal) {
            parser.advance();
            Some(super::expr::parse_expression(parser)?)
        } else {
            None
        };
        let end = init.as_ref().map(|e| e.span()).unwrap_or_else(|| name.span());
        let span = parser.combine_spans(&d_start, &end);
        declarations.push(VarDeclarator { name, init, span });
    }

    let span = parser.combine_spans(&decl_start, &declarations.last().unwrap().span);
    Ok(VarDeclaration { kind, declarations, span })
}

fn parse_function_declaration(parser: &mut Parser, is_async: bool) -> Result<FunctionDeclaration, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::Function)?;
    let is_generator = if parser.check(&Token::Star) {
        parser.advance();
        true
    } else {
        false
    };

    let name = match parser.current().clone() {
        Token::Identifier(sym) => {
            let span = parser.current_span();
            parser.advance();
            Identifier { name: sym, span }
        }
        _ => return Err(parser.unexpected_token(&[Token::Identifier(Symbol::dummy())])),
    };

    let params = parse_param_list(parser)?;
    let body = parse_block_statement(parser)?;
    let span = parser.combine_spans(&start, &body.span);
    Ok(FunctionDeclaration { name, params, body, is_async, is_generator, span })
}

fn parse_class_body(parser: &mut Parser) -> Result<(Vec<ClassMember>, Span), ParseError> {
    parser.expect(Token::LeftBrace)?;
    let mut members = Vec::new();
    let mut guard = LoopGuard::new("class_body");

    while !parser.check(&Token::RightBrace) && !parser.at_eof() {
        guard.check()?;
        if parser.check(&Token::Semicolon) {
            parser.advance();
            continue;
        }
        members.push(parse_class_member(parser)?);
    }

    let end = parser.current_span();
    parser.expect(Token::RightBrace)?;
    Ok((members, end))
}

fn parse_class_member(parser: &mut Parser) -> Result<ClassMember, ParseError> {
    let start = parser.current_span();
    let not_a_key_follows =
        |parser: &Parser| !matches!(parser.peek(), Some(Token::LeftParen) | Some(Token::Equal) | Some(Token::Semicolon) | Some(Token::RightBrace));

    let is_static = if parser.at_contextual("static") && not_a_key_follows(parser) {
        parser.advance();
        true
    } else {
        false
    };

    let mut kind = PropertyAccessKind::Method;
    if (parser.at_contextual("get") || parser.at_contextual("set")) && not_a_key_follows(parser) {
        kind = if parser.at_contextual("get") { PropertyAccessKind::Get } else { PropertyAccessKind::Set };
        parser.advance();
    }

    let mut is_async = false;
    if kind == PropertyAccessKind::Method && parser.at_contextual("async") && not_a_key_follows(parser) {
        is_async = true;
        parser.advance();
    }
    let is_generator = if kind == PropertyAccessKind::Method && parser.check(&Token::Star) {
        parser.advance();
        true
    } else {
        false
    };

    let key = super::expr::parse_property_key(parser)?;

    if parser.check(&Token::LeftParen) {
        let params = parse_param_list(parser)?;
        let body = parse_block_statement(parser)?;
        let fn_span = parser.combine_spans(&start, &body.span);
        let function = FunctionExpression { name: None, params, body, is_async, is_generator, span: fn_span };
        return Ok(ClassMember::Method(ClassMethod { key, kind, is_static, function, span: fn_span }));
    }

    let value = if parser.check(&Token::Equal) {
        parser.advance();
        Some(super::expr::parse_expression(parser)?)
    } else {
        None
    };
    let end = value.as_ref().map(|e| e.span()).unwrap_or_else(|| super::expr::key_span(&key));
    let span = parser.combine_spans(&start, &end);
    parser.consume_semicolon()?;
    Ok(ClassMember::Field(ClassField { key, value, is_static, span }))
}

fn parse_class_declaration(parser: &mut Parser) -> Result<ClassDeclaration, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::Class)?;
    let name = match parser.current().clone() {
        Token::Identifier(sym) => {
            let span = parser.current_span();
            parser.advance();
            Identifier { name: sym, span }
        }
        _ => return Err(parser.unexpected_token(&[Token::Identifier(Symbol::dummy())])),
    };
    let superclass = if parser.check(&Token::Extends) {
        parser.advance();
        Some(super::expr::parse_expression(parser)?)
    } else {
        None
    };
    let (body, end) = parse_class_body(parser)?;
    let span = parser.combine_spans(&start, &end);
    Ok(ClassDeclaration { name, superclass, body, span })
}

pub(super) fn parse_class_expression(parser: &mut Parser) -> Result<Expression, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::Class)?;
    let name = if let Token::Identifier(sym) = parser.current().clone() {
        let span = parser.current_span();
        parser.advance();
        Some(Identifier { name: sym, span })
    } else {
        None
    };
    let superclass = if parser.check(&Token::Extends) {
        parser.advance();
        Some(Box::new(super::expr::parse_expression(parser)?))
    } else {
        None
    };
    let (body, end) = parse_class_body(parser)?;
    let span = parser.combine_spans(&start, &end);
    Ok(Expression::Class(ClassExpression { name, superclass, body, span }))
}

fn parse_if_statement(parser: &mut Parser) -> Result<IfStatement, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::If)?;
    parser.expect(Token::LeftParen)?;
    let test = super::expr::parse_sequence_expression(parser)?;
    parser.expect(Token::RightParen)?;
    let consequent = Box::new(parse_statement(parser)?);
    let alternate = if parser.check(&Token::Else) {
        parser.advance();
        Some(Box::new(parse_statement(parser)?))
    } else {
        None
    };
    let end = alternate.as_ref().map(|s| s.span()).unwrap_or_else(|| consequent.span());
    let span = parser.combine_spans(&start, &end);
    Ok(IfStatement { test, consequent, alternate, span })
}

fn parse_while_statement(parser: &mut Parser) -> Result<WhileStatement, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::While)?;
    parser.expect(Token::LeftParen)?;
    let test = super::expr::parse_sequence_expression(parser)?;
    parser.expect(Token::RightParen)?;
    let body = Box::new(parse_statement(parser)?);
    let end = body.span();
    let span = parser.combine_spans(&start, &end);
    Ok(WhileStatement { test, body, span })
}

fn parse_do_while_statement(parser: &mut Parser) -> Result<DoWhileStatement, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::Do)?;
    let body = Box::new(parse_statement(parser)?);
    parser.expect(Token::While)?;
    parser.expect(Token::LeftParen)?;
    let test = super::expr::parse_sequence_expression(parser)?;
    let end = parser.current_span();
    parser.expect(Token::RightParen)?;
    parser.consume_semicolon()?;
    let span = parser.combine_spans(&start, &end);
    Ok(DoWhileStatement { body, test, span })
}

fn parse_for_statement(parser: &mut Parser) -> Result<Statement, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::For)?;
    let is_await = if parser.at_contextual("await") {
        parser.advance();
        true
    } else {
        false
    };
    parser.expect(Token::LeftParen)?;

    if parser.check(&Token::Semicolon) {
        return parse_for_rest(parser, start, None);
    }

    if matches!(parser.current(), Token::Var | Token::Let | Token::Const) {
        let kind = match parser.current() {
            Token::Var => VarKind::Var,
            Token::Let => VarKind::Let,
            Token::Const => VarKind::Const,
            _ => unreachable!(),
        };
        let decl_start = parser.current_span();
        parser.advance();
        let pattern = parse_pattern(parser)?;

        if parser.check(&Token::In) || parser.at_contextual("of") {
            return parse_for_in_of_rest(parser, start, ForBinding::VarKind(kind, pattern), is_await);
        }

        let init = parse_var_declaration_rest(parser, kind, decl_start, pattern)?;
        return parse_for_rest(parser, start, Some(ForInit::VarDeclaration(init)));
    }

    let expr_start = parser.current_span();
    let expr = super::expr::parse_sequence_expression(parser)?;

    if parser.check(&Token::In) || parser.at_contextual("of") {
        if !expr.is_assignment_target() {
            return Err(ParseError::invalid_syntax("invalid left-hand side in for-in/for-of loop", expr_start));
        }
        let left = ForBinding::Pattern(expression_to_pattern(expr)?);
        return parse_for_in_of_rest(parser, start, left, is_await);
    }

    parse_for_rest(parser, start, Some(ForInit::Expression(expr)))
}

fn parse_for_in_of_rest(parser: &mut Parser, start: Span, left: ForBinding, is_await: bool) -> Result<Statement, ParseError> {
    let is_of = parser.at_contextual("of");
    parser.advance();
    let right = if is_of { super::expr::parse_expression(parser)? } else { super::expr::parse_sequence_expression(parser)? };
    parser.expect(Token::RightParen)?;
    let body = Box::new(parse_statement(parser)?);
    let end = body.span();
    let span = parser.combine_spans(&start, &end);
    if is_of {
        Ok(Statement::ForOf(ForOfStatement { left, right, body, is_await, span }))
    } else {
        Ok(Statement::ForIn(ForInStatement { left, right, body, span }))
    }
}

fn parse_for_rest(parser: &mut Parser, start: Span, init: Option<ForInit>) -> Result<Statement, ParseError> {
    parser.expect(Token::Semicolon)?;
    let test = if parser.check(&Token::Semicolon) { None } else { Some(super::expr::parse_sequence_expression(parser)?) };
    parser.expect(Token::Semicolon)?;
    let update = if parser.check(&Token::RightParen) { None } else { Some(super::expr::parse_sequence_expression(parser)?) };
    parser.expect(Token::RightParen)?;
    let body = Box::new(parse_statement(parser)?);
    let end = body.span();
    let span = parser.combine_spans(&start, &end);
    Ok(Statement::For(ForStatement { init, test, update, body, span }))
}

/// Reinterprets an already-parsed array/object expression as a
/// destructuring pattern for the ambiguous `for (x.y in z)` /
/// `for ([a, b] of z)` left-hand side.
fn expression_to_pattern(expr: Expression) -> Result<Pattern, ParseError> {
    match expr {
        Expression::Identifier(id) => Ok(Pattern::Identifier(id)),
        Expression::Array(arr) => array_expression_to_pattern(arr),
        Expression::Object(obj) => object_expression_to_pattern(obj),
        other => {
            let span = other.span();
            Err(ParseError::invalid_syntax("unsupported left-hand side in for-in/for-of loop", span))
        }
    }
}

fn array_expression_to_pattern(arr: ArrayExpression) -> Result<Pattern, ParseError> {
    let span = arr.span;
    let mut elements = Vec::new();
    let mut rest = None;
    for el in arr.elements {
        match el {
            None => elements.push(None),
            Some(Expression::Spread(s)) => {
                rest = Some(Box::new(expression_to_pattern(*s.argument)?));
            }
            Some(Expression::Assignment(a)) if a.operator == AssignmentOperator::Assign => {
                let elem_span = a.span;
                let pattern = expression_to_pattern(*a.left)?;
                elements.push(Some(PatternElement { pattern, default: Some(*a.right), span: elem_span }));
            }
            Some(other) => {
                let elem_span = other.span();
                let pattern = expression_to_pattern(other)?;
                elements.push(Some(PatternElement { pattern, default: None, span: elem_span }));
            }
        }
    }
    Ok(Pattern::Array(ArrayPattern { elements, rest, span }))
}

fn object_expression_to_pattern(obj: ObjectExpression) -> Result<Pattern, ParseError> {
    let span = obj.span;
    let mut properties = Vec::new();
    let mut rest = None;
    for prop in obj.properties {
        match prop {
            ObjectProperty::Spread(s) => match *s.argument {
                Expression::Identifier(id) => rest = Some(id),
                other => {
                    let span = other.span();
                    return Err(ParseError::invalid_syntax("rest element must be an identifier", span));
                }
            },
            ObjectProperty::Property(p) => {
                let key = match &p.key {
                    PropertyKey::Identifier(id) => id.clone(),
                    _ => return Err(ParseError::invalid_syntax("unsupported destructuring key", p.span)),
                };
                let (value, default) = match p.value {
                    Expression::Assignment(a) if a.operator == AssignmentOperator::Assign => (expression_to_pattern(*a.left)?, Some(*a.right)),
                    other => (expression_to_pattern(other)?, None),
                };
                properties.push(ObjectPatternProperty { key, value, default, span: p.span });
            }
            ObjectProperty::Method(m) => {
                return Err(ParseError::invalid_syntax("method shorthand is not a valid destructuring target", m.span));
            }
        }
    }
    Ok(Pattern::Object(ObjectPattern { properties, rest, span }))
}

fn can_end_statement_here(parser: &Parser) -> bool {
    parser.preceded_by_newline() || parser.check(&Token::Semicolon) || parser.check(&Token::RightBrace) || parser.at_eof()
}

fn parse_return_statement(parser: &mut Parser) -> Result<ReturnStatement, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::Return)?;
    let argument = if can_end_statement_here(parser) { None } else { Some(super::expr::parse_sequence_expression(parser)?) };
    let end = argument.as_ref().map(|e| e.span()).unwrap_or(start);
    parser.consume_semicolon()?;
    let span = parser.combine_spans(&start, &end);
    Ok(ReturnStatement { argument, span })
}

fn parse_optional_label(parser: &mut Parser) -> Result<Option<Identifier>, ParseError> {
    if !parser.preceded_by_newline() {
        if let Token::Identifier(sym) = parser.current().clone() {
            let span = parser.current_span();
            parser.advance();
            return Ok(Some(Identifier { name: sym, span }));
        }
    }
    Ok(None)
}

fn parse_break_statement(parser: &mut Parser) -> Result<BreakStatement, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::Break)?;
    let label = parse_optional_label(parser)?;
    let end = label.as_ref().map(|l| l.span).unwrap_or(start);
    parser.consume_semicolon()?;
    let span = parser.combine_spans(&start, &end);
    Ok(BreakStatement { label, span })
}

fn parse_continue_statement(parser: &mut Parser) -> Result<ContinueStatement, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::Continue)?;
    let label = parse_optional_label(parser)?;
    let end = label.as_ref().map(|l| l.span).unwrap_or(start);
    parser.consume_semicolon()?;
    let span = parser.combine_spans(&start, &end);
    Ok(ContinueStatement { label, span })
}

fn parse_throw_statement(parser: &mut Parser) -> Result<ThrowStatement, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::Throw)?;
    if parser.preceded_by_newline() {
        return Err(ParseError::invalid_syntax("illegal newline after throw", parser.current_span()));
    }
    let argument = super::expr::parse_sequence_expression(parser)?;
    let end = argument.span();
    let span = parser.combine_spans(&start, &end);
    parser.consume_semicolon()?;
    Ok(ThrowStatement { argument, span })
}

fn parse_try_statement(parser: &mut Parser) -> Result<TryStatement, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::Try)?;
    let block = parse_block_statement(parser)?;

    let handler = if parser.check(&Token::Catch) {
        let catch_start = parser.current_span();
        parser.advance();
        let param = if parser.check(&Token::LeftParen) {
            parser.advance();
            let p = parse_pattern(parser)?;
            parser.expect(Token::RightParen)?;
            Some(p)
        } else {
            None
        };
        let body = parse_block_statement(parser)?;
        let span = parser.combine_spans(&catch_start, &body.span);
        Some(CatchClause { param, body, span })
    } else {
        None
    };

    let finalizer = if parser.check(&Token::Finally) {
        parser.advance();
        Some(parse_block_statement(parser)?)
    } else {
        None
    };

    if handler.is_none() && finalizer.is_none() {
        return Err(ParseError::invalid_syntax("missing catch or finally after try", start));
    }

    let end = finalizer.as_ref().map(|f| f.span).unwrap_or_else(|| handler.as_ref().map(|h| h.span).unwrap_or(block.span));
    let span = parser.combine_spans(&start, &end);
    Ok(TryStatement { block, handler, finalizer, span })
}

fn parse_switch_statement(parser: &mut Parser) -> Result<SwitchStatement, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::Switch)?;
    parser.expect(Token::LeftParen)?;
    let discriminant = super::expr::parse_sequence_expression(parser)?;
    parser.expect(Token::RightParen)?;
    parser.expect(Token::LeftBrace)?;

    let mut cases = Vec::new();
    let mut guard = LoopGuard::new("switch_cases");
    while !parser.check(&Token::RightBrace) && !parser.at_eof() {
        guard.check()?;
        let case_start = parser.current_span();
        let test = if parser.check(&Token::Case) {
            parser.advance();
            Some(super::expr::parse_sequence_expression(parser)?)
        } else {
            parser.expect(Token::Default)?;
            None
        };
        parser.expect(Token::Colon)?;

        let mut consequent = Vec::new();
        let mut inner_guard = LoopGuard::new("switch_case_body");
        while !parser.check(&Token::Case) && !parser.check(&Token::Default) && !parser.check(&Token::RightBrace) && !parser.at_eof() {
            inner_guard.check()?;
            consequent.push(parse_statement(parser)?);
        }
        let end = consequent.last().map(|s| s.span()).unwrap_or(case_start);
        let span = parser.combine_spans(&case_start, &end);
        cases.push(SwitchCase { test, consequent, span });
    }

    let end = parser.current_span();
    parser.expect(Token::RightBrace)?;
    let span = parser.combine_spans(&start, &end);
    Ok(SwitchStatement { discriminant, cases, span })
}

fn parse_binding_identifier(parser: &mut Parser) -> Result<Identifier, ParseError> {
    match parser.current().clone() {
        Token::Identifier(sym) => {
            let span = parser.current_span();
            parser.advance();
            Ok(Identifier { name: sym, span })
        }
        _ => Err(parser.unexpected_token(&[Token::Identifier(Symbol::dummy())])),
    }
}

fn parse_import_declaration(parser: &mut Parser) -> Result<ImportDeclaration, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::Import)?;

    let mut specifiers = Vec::new();

    if !matches!(parser.current(), Token::StringLiteral(_)) {
        let mut guard = LoopGuard::new("import_specifiers");
        loop {
            guard.check()?;
            if parser.check(&Token::Star) {
                parser.advance();
                if !parser.at_contextual("as") {
                    return Err(parser.unexpected_token(&[Token::Identifier(Symbol::dummy())]));
                }
                parser.advance();
                specifiers.push(ImportSpecifier::Namespace(parse_binding_identifier(parser)?));
            } else if parser.check(&Token::LeftBrace) {
                parser.advance();
                let mut inner_guard = LoopGuard::new("import_named_specifiers");
                while !parser.check(&Token::RightBrace) && !parser.at_eof() {
                    inner_guard.check()?;
                    let imported = parse_binding_identifier(parser)?;
                    let local = if parser.at_contextual("as") {
                        parser.advance();
                        parse_binding_identifier(parser)?
                    } else {
                        imported.clone()
                    };
                    specifiers.push(ImportSpecifier::Named { imported, local });
                    if parser.check(&Token::Comma) {
                        parser.advance();
                    } else {
                        break;
                    }
                }
                parser.expect(Token::RightBrace)?;
            } else if matches!(parser.current(), Token::Identifier(_)) {
                specifiers.push(ImportSpecifier::Default(parse_binding_identifier(parser)?));
            } else {
                return Err(parser.unexpected_token(&[Token::Identifier(Symbol::dummy())]));
            }

            if parser.check(&Token::Comma) {
                parser.advance();
            } else {
                break;
            }
        }

        if !parser.at_contextual("from") {
            return Err(parser.unexpected_token(&[Token::Identifier(Symbol::dummy())]).with_suggestion("expected `from`"));
        }
        parser.advance();
    }

    let source = match parser.current().clone() {
        Token::StringLiteral(sym) => {
            parser.advance();
            sym
        }
        _ => return Err(parser.unexpected_token(&[Token::StringLiteral(Symbol::dummy())])),
    };

    let end = parser.current_span();
    parser.consume_semicolon()?;
    let span = parser.combine_spans(&start, &end);
    Ok(ImportDeclaration { specifiers, source, span })
}

fn parse_export_declaration(parser: &mut Parser) -> Result<ExportDeclaration, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::Export)?;

    if parser.check(&Token::Default) {
        parser.advance();
        let declaration: Box<Expression> = if parser.check(&Token::Function) {
            Box::new(super::expr::parse_function_expression(parser, false)?)
        } else if parser.at_contextual("async") && matches!(parser.peek(), Some(Token::Function)) {
            parser.advance();
            Box::new(super::expr::parse_function_expression(parser, true)?)
        } else if parser.check(&Token::Class) {
            Box::new(parse_class_expression(parser)?)
        } else {
            Box::new(super::expr::parse_expression(parser)?)
        };
        let end = declaration.span();
        parser.consume_semicolon()?;
        let span = parser.combine_spans(&start, &end);
        return Ok(ExportDeclaration::Default { declaration, span });
    }

    if parser.check(&Token::Star) {
        parser.advance();
        if !parser.at_contextual("from") {
            return Err(parser.unexpected_token(&[Token::Identifier(Symbol::dummy())]).with_suggestion("expected `from`"));
        }
        parser.advance();
        let source = match parser.current().clone() {
            Token::StringLiteral(sym) => {
                parser.advance();
                sym
            }
            _ => return Err(parser.unexpected_token(&[Token::StringLiteral(Symbol::dummy())])),
        };
        let end = parser.current_span();
        parser.consume_semicolon()?;
        let span = parser.combine_spans(&start, &end);
        return Ok(ExportDeclaration::All { source, span });
    }

    if parser.check(&Token::LeftBrace) {
        parser.advance();
        let mut specifiers = Vec::new();
        let mut guard = LoopGuard::new("export_specifiers");
        while !parser.check(&Token::RightBrace) && !parser.at_eof() {
            guard.check()?;
            let local = parse_binding_identifier(parser)?;
            let exported = if parser.at_contextual("as") {
                parser.advance();
                parse_binding_identifier(parser)?
            } else {
                local.clone()
            };
            specifiers.push((local, exported));
            if parser.check(&Token::Comma) {
                parser.advance();
            } else {
                break;
            }
        }
        let end = parser.current_span();
        parser.expect(Token::RightBrace)?;
        parser.consume_semicolon()?;
        let span = parser.combine_spans(&start, &end);
        return Ok(ExportDeclaration::Named { declaration: None, specifiers, span });
    }

    let declaration: Statement = match parser.current() {
        Token::Var | Token::Let | Token::Const => Statement::VarDeclaration(parse_var_declaration(parser)?),
        Token::Function => Statement::FunctionDeclaration(parse_function_declaration(parser, false)?),
        Token::Class => Statement::ClassDeclaration(parse_class_declaration(parser)?),
        _ => {
            if parser.at_contextual("async") && matches!(parser.peek(), Some(Token::Function)) {
                parser.advance();
                Statement::FunctionDeclaration(parse_function_declaration(parser, true)?)
            } else {
                return Err(parser.unexpected_token(&[Token::Var, Token::Let, Token::Const, Token::Function, Token::Class]));
            }
        }
    };
    let end = declaration.span();
    let span = parser.combine_spans(&start, &end);
    Ok(ExportDeclaration::Named { declaration: Some(Box::new(declaration)), specifiers: Vec::new(), span })
}

fn parse_labeled_or_expression_statement(parser: &mut Parser) -> Result<Statement, ParseError> {
    let start = parser.current_span();
    if let Token::Identifier(name) = parser.current().clone() {
        if matches!(parser.peek(), Some(Token::Colon)) {
            parser.advance();
            parser.advance();
            let body = Box::new(parse_statement(parser)?);
            let end = body.span();
            let span = parser.combine_spans(&start, &end);
            return Ok(Statement::Labeled(LabeledStatement { label: Identifier { name, span: start }, body, span }));
        }
    }
    let expr = super::expr::parse_sequence_expression(parser)?;
    let end = expr.span();
    parser.consume_semicolon()?;
    let span = parser.combine_spans(&start, &end);
    Ok(Statement::Expression(ExpressionStatement { expression: expr, span }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(source: &str) -> Statement {
        let mut parser = Parser::new(source);
        parse_statement(&mut parser).expect("statement should parse")
    }

    #[test]
    fn parses_let_declaration() {
        let stmt = parse_one("let x = 1;");
        assert!(matches!(stmt, Statement::VarDeclaration(_)));
    }

    #[test]
    fn const_without_initializer_is_an_error() {
        let mut parser = Parser::new("const x;");
        assert!(parse_statement(&mut parser).is_err());
    }

    #[test]
    fn parses_function_declaration() {
        let stmt = parse_one("function add(a, b) { return a + b; }");
        match stmt {
            Statement::FunctionDeclaration(f) => assert_eq!(f.params.len(), 2),
            other => panic!("expected function declaration, got {other:?}"),
        }
    }

    #[test]
    fn parses_class_declaration_with_methods_and_fields() {
        let stmt = parse_one("class Point { x = 0; static origin() { return new Point(); } get value() { return this.x; } }");
        match stmt {
            Statement::ClassDeclaration(c) => assert_eq!(c.body.len(), 3),
            other => panic!("expected class declaration, got {other:?}"),
        }
    }

    #[test]
    fn parses_if_else() {
        let stmt = parse_one("if (a) { b(); } else { c(); }");
        match stmt {
            Statement::If(s) => assert!(s.alternate.is_some()),
            other => panic!("expected if statement, got {other:?}"),
        }
    }

    #[test]
    fn parses_classic_for_loop() {
        let stmt = parse_one("for (let i = 0; i < 10; i++) { sum += i; }");
        assert!(matches!(stmt, Statement::For(_)));
    }

    #[test]
    fn parses_for_of_loop() {
        let stmt = parse_one("for (const item of items) { use(item); }");
        match stmt {
            Statement::ForOf(s) => assert!(matches!(s.left, ForBinding::VarKind(VarKind::Const, _))),
            other => panic!("expected for-of statement, got {other:?}"),
        }
    }

    #[test]
    fn parses_for_in_loop() {
        let stmt = parse_one("for (const key in obj) { use(key); }");
        assert!(matches!(stmt, Statement::ForIn(_)));
    }

    #[test]
    fn parses_try_catch_finally() {
        let stmt = parse_one("try { risky(); } catch (e) { handle(e); } finally { cleanup(); }");
        match stmt {
            Statement::Try(t) => {
                assert!(t.handler.is_some());
                assert!(t.finalizer.is_some());
            }
            other => panic!("expected try statement, got {other:?}"),
        }
    }

    #[test]
    fn try_without_catch_or_finally_is_an_error() {
        let mut parser = Parser::new("try { risky(); }");
        assert!(parse_statement(&mut parser).is_err());
    }

    #[test]
    fn parses_switch_statement() {
        let stmt = parse_one("switch (x) { case 1: a(); break; default: b(); }");
        match stmt {
            Statement::Switch(s) => assert_eq!(s.cases.len(), 2),
            other => panic!("expected switch statement, got {other:?}"),
        }
    }

    #[test]
    fn parses_import_declaration() {
        let stmt = parse_one("import { a, b as c } from \"mod\";");
        match stmt {
            Statement::Import(i) => assert_eq!(i.specifiers.len(), 2),
            other => panic!("expected import declaration, got {other:?}"),
        }
    }

    #[test]
    fn parses_export_default_function() {
        let stmt = parse_one("export default function () { return 1; }");
        assert!(matches!(stmt, Statement::Export(_)));
    }

    #[test]
    fn parses_labeled_statement() {
        let stmt = parse_one("outer: while (true) { break outer; }");
        assert!(matches!(stmt, Statement::Labeled(_)));
    }

    #[test]
    fn asi_inserts_semicolon_across_newline() {
        let mut parser = Parser::new("let x = 1\nlet y = 2");
        let first = parse_statement(&mut parser).unwrap();
        assert!(matches!(first, Statement::VarDeclaration(_)));
        let second = parse_statement(&mut parser).unwrap();
        assert!(matches!(second, Statement::VarDeclaration(_)));
    }
}
