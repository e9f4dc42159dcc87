//! Expression parsing (spec §4.2's expression grammar).
//!
//! Arrow functions are disambiguated from parenthesized expressions by
//! speculative parsing: try the parameter-list shape first, commit only if
//! `=>` follows, otherwise restore the cursor and fall through to a normal
//! parenthesized/sequence expression.

use super::guards::{LoopGuard, MAX_PARSE_DEPTH};
use super::pattern::{parse_param_list, parse_pattern};
use super::precedence::{precedence_of, is_right_associative, tighter, Precedence};
use super::{ParseError, Parser};
use crate::parser::ast::*;
use crate::parser::interner::Symbol;
use crate::parser::token::{Span, TemplatePart, Token};

/// Parses an expression up to (but not including) the comma operator —
/// the shape needed for array elements, call arguments, and pattern
/// defaults.
pub fn parse_expression(parser: &mut Parser) -> Result<Expression, ParseError> {
    parser.depth += 1;
    if parser.depth > MAX_PARSE_DEPTH {
        parser.depth -= 1;
        return Err(ParseError::parser_limit_exceeded(
            format!("Maximum nesting depth ({}) exceeded in expression", MAX_PARSE_DEPTH),
            parser.current_span(),
        ));
    }
    let result = parse_assignment(parser);
    parser.depth -= 1;
    result
}

/// Parses a full expression, including the comma operator (spec §4.2) —
/// used in statement position and inside parentheses.
pub fn parse_sequence_expression(parser: &mut Parser) -> Result<Expression, ParseError> {
    let start = parser.current_span();
    let first = parse_expression(parser)?;
    if !parser.check(&Token::Comma) {
        return Ok(first);
    }

    let mut expressions = vec![first];
    let mut guard = LoopGuard::new("sequence_expression");
    while parser.check(&Token::Comma) {
        guard.check()?;
        parser.advance();
        expressions.push(parse_expression(parser)?);
    }
    let span = parser.combine_spans(&start, &expressions.last().unwrap().span());
    Ok(Expression::Sequence(SequenceExpression { expressions, span }))
}

fn parse_assignment(parser: &mut Parser) -> Result<Expression, ParseError> {
    if let Some(arrow) = try_parse_arrow(parser)? {
        return Ok(arrow);
    }

    let start = parser.current_span();
    let left = parse_conditional(parser)?;

    if let Some(operator) = assignment_operator(parser.current()) {
        if !left.is_assignment_target() {
            return Err(ParseError::invalid_syntax("invalid assignment target", left.span()));
        }
        parser.advance();
        let right = parse_assignment(parser)?;
        let span = parser.combine_spans(&start, &right.span());
        return Ok(Expression::Assignment(AssignmentExpression {
            operator,
            left: Box::new(left),
            right: Box::new(right),
            span,
        }));
    }

    Ok(left)
}

fn try_parse_arrow(parser: &mut Parser) -> Result<Option<Expression>, ParseError> {
    let checkpoint = parser.save();
    let start = parser.current_span();

    let mut is_async = false;
    if parser.at_contextual("async") && !matches!(parser.peek(), Some(Token::Arrow)) {
        if matches!(parser.peek(), Some(Token::LeftParen) | Some(Token::Identifier(_))) {
            parser.advance();
            is_async = true;
        }
    }

    if let Token::Identifier(name) = parser.current().clone() {
        if matches!(parser.peek(), Some(Token::Arrow)) {
            let id_span = parser.current_span();
            parser.advance();
            parser.advance();
            let body = match parse_arrow_body(parser) {
                Ok(body) => body,
                Err(e) => return Err(e),
            };
            let end = arrow_body_span(&body);
            let span = parser.combine_spans(&start, &end);
            return Ok(Some(Expression::Arrow(ArrowFunction {
                params: vec![Pattern::Identifier(Identifier { name, span: id_span })],
                body,
                is_async,
                span,
            })));
        }
    }

    if parser.check(&Token::LeftParen) {
        match parse_param_list(parser) {
            Ok(params) if parser.check(&Token::Arrow) => {
                parser.advance();
                let body = parse_arrow_body(parser)?;
                let end = arrow_body_span(&body);
                let span = parser.combine_spans(&start, &end);
                return Ok(Some(Expression::Arrow(ArrowFunction { params, body, is_async, span })));
            }
            _ => {
                parser.restore(checkpoint);
                return Ok(None);
            }
        }
    }

    parser.restore(checkpoint);
    Ok(None)
}

fn parse_arrow_body(parser: &mut Parser) -> Result<ArrowBody, ParseError> {
    if parser.check(&Token::LeftBrace) {
        Ok(ArrowBody::Block(super::stmt::parse_block_statement(parser)?))
    } else {
        Ok(ArrowBody::Expression(Box::new(parse_expression(parser)?)))
    }
}

fn arrow_body_span(body: &ArrowBody) -> Span {
    match body {
        ArrowBody::Block(b) => b.span,
        ArrowBody::Expression(e) => e.span(),
    }
}

fn parse_conditional(parser: &mut Parser) -> Result<Expression, ParseError> {
    let start = parser.current_span();
    let test = parse_binary(parser, Precedence::NullishCoalescing)?;

    if parser.check(&Token::Question) {
        parser.advance();
        let consequent = parse_assignment(parser)?;
        parser.expect(Token::Colon)?;
        let alternate = parse_assignment(parser)?;
        let span = parser.combine_spans(&start, &alternate.span());
        return Ok(Expression::Conditional(ConditionalExpression {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
            span,
        }));
    }

    Ok(test)
}

fn parse_binary(parser: &mut Parser, min_prec: Precedence) -> Result<Expression, ParseError> {
    let start = parser.current_span();
    let mut left = parse_unary(parser)?;
    let mut guard = LoopGuard::new("binary_expression");

    loop {
        guard.check()?;
        let op_token = parser.current().clone();
        let prec = precedence_of(&op_token);
        if prec == Precedence::None || prec < min_prec {
            break;
        }
        let right_assoc = is_right_associative(&op_token);
        parser.advance();
        let next_min = if right_assoc { prec } else { tighter(prec) };
        let right = parse_binary(parser, next_min)?;
        let span = parser.combine_spans(&start, &right.span());
        left = combine_binary(&op_token, left, right, span);
    }

    Ok(left)
}

fn combine_binary(op: &Token, left: Expression, right: Expression, span: Span) -> Expression {
    if let Some(operator) = logical_operator(op) {
        return Expression::Logical(LogicalExpression { operator, left: Box::new(left), right: Box::new(right), span });
    }
    let operator = binary_operator(op).expect("precedence_of only admits known binary/logical tokens");
    Expression::Binary(BinaryExpression { operator, left: Box::new(left), right: Box::new(right), span })
}

fn logical_operator(token: &Token) -> Option<LogicalOperator> {
    Some(match token {
        Token::AmpAmp => LogicalOperator::And,
        Token::PipePipe => LogicalOperator::Or,
        Token::QuestionQuestion => LogicalOperator::NullishCoalescing,
        _ => return None,
    })
}

fn binary_operator(token: &Token) -> Option<BinaryOperator> {
    Some(match token {
        Token::Plus => BinaryOperator::Add,
        Token::Minus => BinaryOperator::Subtract,
        Token::Star => BinaryOperator::Multiply,
        Token::Slash => BinaryOperator::Divide,
        Token::Percent => BinaryOperator::Modulo,
        Token::StarStar => BinaryOperator::Exponent,
        Token::EqualEqual => BinaryOperator::Equal,
        Token::BangEqual => BinaryOperator::NotEqual,
        Token::EqualEqualEqual => BinaryOperator::StrictEqual,
        Token::BangEqualEqual => BinaryOperator::StrictNotEqual,
        Token::Less => BinaryOperator::LessThan,
        Token::LessEqual => BinaryOperator::LessEqual,
        Token::Greater => BinaryOperator::GreaterThan,
        Token::GreaterEqual => BinaryOperator::GreaterEqual,
        Token::Amp => BinaryOperator::BitwiseAnd,
        Token::Pipe => BinaryOperator::BitwiseOr,
        Token::Caret => BinaryOperator::BitwiseXor,
        Token::LessLess => BinaryOperator::LeftShift,
        Token::GreaterGreater => BinaryOperator::RightShift,
        Token::GreaterGreaterGreater => BinaryOperator::UnsignedRightShift,
        Token::In => BinaryOperator::In,
        Token::Instanceof => BinaryOperator::Instanceof,
        _ => return None,
    })
}

fn assignment_operator(token: &Token) -> Option<AssignmentOperator> {
    Some(match token {
        Token::Equal => AssignmentOperator::Assign,
        Token::PlusEqual => AssignmentOperator::AddAssign,
        Token::MinusEqual => AssignmentOperator::SubAssign,
        Token::StarEqual => AssignmentOperator::MulAssign,
        Token::SlashEqual => AssignmentOperator::DivAssign,
        Token::PercentEqual => AssignmentOperator::ModAssign,
        Token::StarStarEqual => AssignmentOperator::ExpAssign,
        Token::AmpEqual => AssignmentOperator::AndAssign,
        Token::PipeEqual => AssignmentOperator::OrAssign,
        Token::CaretEqual => AssignmentOperator::XorAssign,
        Token::LessLessEqual => AssignmentOperator::LeftShiftAssign,
        Token::GreaterGreaterEqual => AssignmentOperator::RightShiftAssign,
        Token::GreaterGreaterGreaterEqual => AssignmentOperator::UnsignedRightShiftAssign,
        Token::AmpAmpEqual => AssignmentOperator::LogicalAndAssign,
        Token::PipePipeEqual => AssignmentOperator::LogicalOrAssign,
        Token::QuestionQuestionEqual => AssignmentOperator::NullishAssign,
        _ => return None,
    })
}

fn parse_unary(parser: &mut Parser) -> Result<Expression, ParseError> {
    let start = parser.current_span();

    let unary_op = match parser.current() {
        Token::Plus => Some(UnaryOperator::Plus),
        Token::Minus => Some(UnaryOperator::Minus),
        Token::Bang => Some(UnaryOperator::Not),
        Token::Tilde => Some(UnaryOperator::BitwiseNot),
        Token::Typeof => Some(UnaryOperator::Typeof),
        Token::Void => Some(UnaryOperator::Void),
        Token::Delete => Some(UnaryOperator::Delete),
        _ => None,
    };
    if let Some(operator) = unary_op {
        parser.advance();
        let operand = parse_unary(parser)?;
        let span = parser.combine_spans(&start, &operand.span());
        return Ok(Expression::Unary(UnaryExpression { operator, operand: Box::new(operand), span }));
    }

    if matches!(parser.current(), Token::PlusPlus | Token::MinusMinus) {
        let operator = if matches!(parser.current(), Token::PlusPlus) { UpdateOperator::Increment } else { UpdateOperator::Decrement };
        parser.advance();
        let argument = parse_unary(parser)?;
        let span = parser.combine_spans(&start, &argument.span());
        return Ok(Expression::Update(UpdateExpression { operator, argument: Box::new(argument), prefix: true, span }));
    }

    if parser.at_contextual("await") {
        parser.advance();
        let argument = parse_unary(parser)?;
        let span = parser.combine_spans(&start, &argument.span());
        return Ok(Expression::Await(AwaitExpression { argument: Box::new(argument), span }));
    }

    if parser.check(&Token::Yield) {
        parser.advance();
        let delegate = parser.check(&Token::Star);
        if delegate {
            parser.advance();
        }
        let argument = if yield_has_argument(parser) {
            Some(Box::new(parse_assignment(parser)?))
        } else {
            None
        };
        let end = argument.as_ref().map(|a| a.span()).unwrap_or(start);
        let span = parser.combine_spans(&start, &end);
        return Ok(Expression::Yield(YieldExpression { argument, delegate, span }));
    }

    parse_postfix(parser)
}

fn yield_has_argument(parser: &Parser) -> bool {
    if parser.preceded_by_newline() {
        return false;
    }
    !matches!(
        parser.current(),
        Token::Semicolon | Token::RightParen | Token::RightBracket | Token::RightBrace | Token::Comma | Token::Colon | Token::Eof
    )
}

fn parse_postfix(parser: &mut Parser) -> Result<Expression, ParseError> {
    let start = parser.current_span();
    let mut expr = parse_call_chain(parser, start)?;

    if !parser.preceded_by_newline() && matches!(parser.current(), Token::PlusPlus | Token::MinusMinus) {
        let operator = if matches!(parser.current(), Token::PlusPlus) { UpdateOperator::Increment } else { UpdateOperator::Decrement };
        let end = parser.current_span();
        parser.advance();
        let span = parser.combine_spans(&start, &end);
        expr = Expression::Update(UpdateExpression { operator, argument: Box::new(expr), prefix: false, span });
    }

    Ok(expr)
}

fn parse_call_chain(parser: &mut Parser, start: Span) -> Result<Expression, ParseError> {
    let mut expr = parse_new_or_primary(parser)?;
    let mut guard = LoopGuard::new("call_chain");

    loop {
        guard.check()?;
        match parser.current() {
            Token::Dot => {
                parser.advance();
                let property = parse_identifier_name(parser)?;
                let span = parser.combine_spans(&start, &property.span);
                expr = Expression::Member(MemberExpression { object: Box::new(expr), property, optional: false, span });
            }
            Token::QuestionDot => {
                parser.advance();
                if parser.check(&Token::LeftBracket) {
                    parser.advance();
                    let index = parse_sequence_expression(parser)?;
                    let end = parser.current_span();
                    parser.expect(Token::RightBracket)?;
                    let span = parser.combine_spans(&start, &end);
                    expr = Expression::Index(IndexExpression { object: Box::new(expr), index: Box::new(index), optional: true, span });
                } else if parser.check(&Token::LeftParen) {
                    let (arguments, end) = parse_arguments(parser)?;
                    let span = parser.combine_spans(&start, &end);
                    expr = Expression::Call(CallExpression { callee: Box::new(expr), arguments, optional: true, span });
                } else {
                    let property = parse_identifier_name(parser)?;
                    let span = parser.combine_spans(&start, &property.span);
                    expr = Expression::Member(MemberExpression { object: Box::new(expr), property, optional: true, span });
                }
            }
            Token::LeftBracket => {
                parser.advance();
                let index = parse_sequence_expression(parser)?;
                let end = parser.current_span();
                parser.expect(Token::RightBracket)?;
                let span = parser.combine_spans(&start, &end);
                expr = Expression::Index(IndexExpression { object: Box::new(expr), index: Box::new(index), optional: false, span });
            }
            Token::LeftParen => {
                let (arguments, end) = parse_arguments(parser)?;
                let span = parser.combine_spans(&start, &end);
                expr = Expression::Call(CallExpression { callee: Box::new(expr), arguments, optional: false, span });
            }
            _ => break,
        }
    }

    Ok(expr)
}

fn parse_new_or_primary(parser: &mut Parser) -> Result<Expression, ParseError> {
    if parser.check(&Token::New) {
        let start = parser.current_span();
        parser.advance();

        if parser.check(&Token::Dot) {
            parser.advance();
            let property = parse_identifier_name(parser)?;
            let span = parser.combine_spans(&start, &property.span);
            return Ok(Expression::MetaProperty(MetaProperty {
                meta: parser.intern("new"),
                property: property.name,
                span,
            }));
        }

        let callee = parse_member_only_chain(parser, start)?;
        let (arguments, end) = if parser.check(&Token::LeftParen) {
            parse_arguments(parser)?
        } else {
            (Vec::new(), callee.span())
        };
        let span = parser.combine_spans(&start, &end);
        return Ok(Expression::New(NewExpression { callee: Box::new(callee), arguments, span }));
    }

    parse_primary(parser)
}

fn parse_member_only_chain(parser: &mut Parser, start: Span) -> Result<Expression, ParseError> {
    let mut expr = parse_new_or_primary(parser)?;
    let mut guard = LoopGuard::new("new_member_chain");

    loop {
        guard.check()?;
        match parser.current() {
            Token::Dot => {
                parser.advance();
                let property = parse_identifier_name(parser)?;
                let span = parser.combine_spans(&start, &property.span);
                expr = Expression::Member(MemberExpression { object: Box::new(expr), property, optional: false, span });
            }
            Token::LeftBracket => {
                parser.advance();
                let index = parse_sequence_expression(parser)?;
                let end = parser.current_span();
                parser.expect(Token::RightBracket)?;
                let span = parser.combine_spans(&start, &end);
                expr = Expression::Index(IndexExpression { object: Box::new(expr), index: Box::new(index), optional: false, span });
            }
            _ => break,
        }
    }

    Ok(expr)
}

fn parse_arguments(parser: &mut Parser) -> Result<(Vec<Expression>, Span), ParseError> {
    parser.expect(Token::LeftParen)?;
    let mut arguments = Vec::new();
    let mut guard = LoopGuard::new("call_arguments");

    while !parser.check(&Token::RightParen) && !parser.at_eof() {
        guard.check()?;
        if parser.check(&Token::DotDotDot) {
            let spread_start = parser.current_span();
            parser.advance();
            let argument = parse_expression(parser)?;
            let span = parser.combine_spans(&spread_start, &argument.span());
            arguments.push(Expression::Spread(SpreadElement { argument: Box::new(argument), span }));
        } else {
            arguments.push(parse_expression(parser)?);
        }
        if parser.check(&Token::Comma) {
            parser.advance();
        } else {
            break;
        }
    }

    let end = parser.current_span();
    parser.expect(Token::RightParen)?;
    Ok((arguments, end))
}

fn parse_primary(parser: &mut Parser) -> Result<Expression, ParseError> {
    if parser.at_contextual("async") && matches!(parser.peek(), Some(Token::Function)) {
        parser.advance();
        return parse_function_expression(parser, true);
    }

    let span = parser.current_span();
    match parser.current().clone() {
        Token::IntLiteral(value, _) => {
            parser.advance();
            Ok(Expression::IntLiteral(IntLiteral { value, span }))
        }
        Token::FloatLiteral(value) => {
            parser.advance();
            Ok(Expression::FloatLiteral(FloatLiteral { value, span }))
        }
        Token::BigIntLiteral(digits) => {
            parser.advance();
            Ok(Expression::BigIntLiteral(BigIntLiteral { digits, span }))
        }
        Token::StringLiteral(value) => {
            parser.advance();
            Ok(Expression::StringLiteral(StringLiteral { value, span }))
        }
        Token::TemplateLiteral(parts) => {
            parser.advance();
            parse_template_literal(parser, parts, span)
        }
        Token::RegexLiteral { pattern, flags } => {
            parser.advance();
            Ok(Expression::RegexLiteral(RegexLiteral { pattern, flags, span }))
        }
        Token::True => {
            parser.advance();
            Ok(Expression::BooleanLiteral(BooleanLiteral { value: true, span }))
        }
        Token::False => {
            parser.advance();
            Ok(Expression::BooleanLiteral(BooleanLiteral { value: false, span }))
        }
        Token::Null => {
            parser.advance();
            Ok(Expression::NullLiteral(span))
        }
        Token::This => {
            parser.advance();
            Ok(Expression::This(span))
        }
        Token::Super => {
            parser.advance();
            Ok(Expression::Super(span))
        }
        Token::Identifier(name) => {
            parser.advance();
            Ok(Expression::Identifier(Identifier { name, span }))
        }
        Token::LeftBracket => parse_array_literal(parser),
        Token::LeftBrace => parse_object_literal(parser),
        Token::LeftParen => parse_parenthesized(parser),
        Token::Function => parse_function_expression(parser, false),
        Token::Class => super::stmt::parse_class_expression(parser),
        _ => Err(parser.unexpected_token(&[Token::Identifier(Symbol::dummy())])),
    }
}

pub(super) fn parse_function_expression(parser: &mut Parser, is_async: bool) -> Result<Expression, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::Function)?;
    let is_generator = if parser.check(&Token::Star) {
        parser.advance();
        true
    } else {
        false
    };

    let name = if let Token::Identifier(sym) = parser.current().clone() {
        let id_span = parser.current_span();
        parser.advance();
        Some(Identifier { name: sym, span: id_span })
    } else {
        None
    };

    let params = parse_param_list(parser)?;
    let body = super::stmt::parse_block_statement(parser)?;
    let span = parser.combine_spans(&start, &body.span);
    Ok(Expression::Function(FunctionExpression { name, params, body, is_async, is_generator, span }))
}

fn parse_template_literal(parser: &mut Parser, parts: Vec<TemplatePart>, span: Span) -> Result<Expression, ParseError> {
    let mut elements = Vec::with_capacity(parts.len());
    for part in parts {
        match part {
            TemplatePart::String { cooked, raw } => elements.push(TemplateElement::String { cooked, raw }),
            TemplatePart::Expression(tokens) => {
                let expr = parser.parse_embedded_expression(tokens)?;
                elements.push(TemplateElement::Expression(Box::new(expr)));
            }
        }
    }
    Ok(Expression::TemplateLiteral(TemplateLiteral { parts: elements, span }))
}

fn parse_array_literal(parser: &mut Parser) -> Result<Expression, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::LeftBracket)?;
    let mut elements = Vec::new();
    let mut guard = LoopGuard::new("array_literal");

    while !parser.check(&Token::RightBracket) && !parser.at_eof() {
        guard.check()?;
        if parser.check(&Token::Comma) {
            elements.push(None);
            parser.advance();
            continue;
        }
        if parser.check(&Token::DotDotDot) {
            let spread_start = parser.current_span();
            parser.advance();
            let argument = parse_expression(parser)?;
            let span = parser.combine_spans(&spread_start, &argument.span());
            elements.push(Some(Expression::Spread(SpreadElement { argument: Box::new(argument), span })));
        } else {
            elements.push(Some(parse_expression(parser)?));
        }
        if parser.check(&Token::Comma) {
            parser.advance();
        } else {
            break;
        }
    }

    let end = parser.current_span();
    parser.expect(Token::RightBracket)?;
    let span = parser.combine_spans(&start, &end);
    Ok(Expression::Array(ArrayExpression { elements, span }))
}

fn parse_object_literal(parser: &mut Parser) -> Result<Expression, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::LeftBrace)?;
    let mut properties = Vec::new();
    let mut guard = LoopGuard::new("object_literal");

    while !parser.check(&Token::RightBrace) && !parser.at_eof() {
        guard.check()?;
        properties.push(parse_object_property(parser)?);
        if parser.check(&Token::Comma) {
            parser.advance();
        } else {
            break;
        }
    }

    let end = parser.current_span();
    parser.expect(Token::RightBrace)?;
    let span = parser.combine_spans(&start, &end);
    Ok(Expression::Object(ObjectExpression { properties, span }))
}

fn parse_object_property(parser: &mut Parser) -> Result<ObjectProperty, ParseError> {
    let start = parser.current_span();

    if parser.check(&Token::DotDotDot) {
        parser.advance();
        let argument = parse_expression(parser)?;
        let span = parser.combine_spans(&start, &argument.span());
        return Ok(ObjectProperty::Spread(SpreadElement { argument: Box::new(argument), span }));
    }

    let not_a_key_follows = |parser: &Parser| {
        !matches!(parser.peek(), Some(Token::Colon) | Some(Token::Comma) | Some(Token::RightBrace) | Some(Token::LeftParen))
    };

    if (parser.at_contextual("get") || parser.at_contextual("set")) && not_a_key_follows(parser) {
        let is_get = parser.at_contextual("get");
        parser.advance();
        let key = parse_property_key(parser)?;
        let params = parse_param_list(parser)?;
        let body = super::stmt::parse_block_statement(parser)?;
        let fn_span = parser.combine_spans(&start, &body.span);
        let function = FunctionExpression { name: None, params, body, is_async: false, is_generator: false, span: fn_span };
        return Ok(ObjectProperty::Method(MethodProperty {
            key,
            kind: if is_get { MethodKind::Get } else { MethodKind::Set },
            function,
            span: fn_span,
        }));
    }

    let mut is_async = false;
    if parser.at_contextual("async") && not_a_key_follows(parser) {
        is_async = true;
        parser.advance();
    }
    let is_generator = if parser.check(&Token::Star) {
        parser.advance();
        true
    } else {
        false
    };

    let key = parse_property_key(parser)?;

    if parser.check(&Token::LeftParen) {
        let params = parse_param_list(parser)?;
        let body = super::stmt::parse_block_statement(parser)?;
        let fn_span = parser.combine_spans(&start, &body.span);
        let function = FunctionExpression { name: None, params, body, is_async, is_generator, span: fn_span };
        return Ok(ObjectProperty::Method(MethodProperty { key, kind: MethodKind::Method, function, span: fn_span }));
    }

    if parser.check(&Token::Colon) {
        parser.advance();
        let value = parse_expression(parser)?;
        let span = parser.combine_spans(&start, &value.span());
        return Ok(ObjectProperty::Property(Property { key, value, shorthand: false, span }));
    }

    if let PropertyKey::Identifier(id) = &key {
        let value = Expression::Identifier(id.clone());
        let span = id.span;
        return Ok(ObjectProperty::Property(Property { key, value, shorthand: true, span }));
    }

    Err(parser.unexpected_token(&[Token::Colon]))
}

pub(super) fn key_span(key: &PropertyKey) -> Span {
    match key {
        PropertyKey::Identifier(id) => id.span,
        PropertyKey::StringLiteral(s) => s.span,
        PropertyKey::IntLiteral(i) => i.span,
        PropertyKey::Computed(e) => e.span(),
    }
}

pub(super) fn parse_property_key(parser: &mut Parser) -> Result<PropertyKey, ParseError> {
    let span = parser.current_span();
    match parser.current().clone() {
        Token::LeftBracket => {
            parser.advance();
            let expr = parse_expression(parser)?;
            parser.expect(Token::RightBracket)?;
            Ok(PropertyKey::Computed(Box::new(expr)))
        }
        Token::StringLiteral(value) => {
            parser.advance();
            Ok(PropertyKey::StringLiteral(StringLiteral { value, span }))
        }
        Token::IntLiteral(value, _) => {
            parser.advance();
            Ok(PropertyKey::IntLiteral(IntLiteral { value, span }))
        }
        Token::Identifier(name) => {
            parser.advance();
            Ok(PropertyKey::Identifier(Identifier { name, span }))
        }
        other => {
            if let Some(text) = keyword_text(&other) {
                parser.advance();
                let sym = parser.intern(text);
                Ok(PropertyKey::Identifier(Identifier { name: sym, span }))
            } else {
                Err(parser.unexpected_token(&[Token::Identifier(Symbol::dummy())]))
            }
        }
    }
}

fn parse_parenthesized(parser: &mut Parser) -> Result<Expression, ParseError> {
    let start = parser.current_span();
    parser.expect(Token::LeftParen)?;
    let inner = parse_sequence_expression(parser)?;
    let end = parser.current_span();
    parser.expect(Token::RightParen)?;
    let span = parser.combine_spans(&start, &end);
    Ok(Expression::Parenthesized(ParenthesizedExpression { expression: Box::new(inner), span }))
}

/// Property names after `.`/in object literals accept any reserved word,
/// not just identifiers (spec §4.2).
pub(super) fn parse_identifier_name(parser: &mut Parser) -> Result<Identifier, ParseError> {
    let span = parser.current_span();
    match parser.current().clone() {
        Token::Identifier(sym) => {
            parser.advance();
            Ok(Identifier { name: sym, span })
        }
        other => {
            if let Some(text) = keyword_text(&other) {
                parser.advance();
                let sym = parser.intern(text);
                Ok(Identifier { name: sym, span })
            } else {
                Err(parser.unexpected_token(&[Token::Identifier(Symbol::dummy())]))
            }
        }
    }
}

/// Maps reserved-word tokens back to their source text, so they can be
/// used as property names (`obj.class`) and object-literal keys.
pub(super) fn keyword_text(token: &Token) -> Option<&'static str> {
    match token {
        Token::Function => Some("function"),
        Token::Class => Some("class"),
        Token::Let => Some("let"),
        Token::Const => Some("const"),
        Token::Var => Some("var"),
        Token::If => Some("if"),
        Token::Else => Some("else"),
        Token::Switch => Some("switch"),
        Token::Case => Some("case"),
        Token::Default => Some("default"),
        Token::For => Some("for"),
        Token::While => Some("while"),
        Token::Do => Some("do"),
        Token::Break => Some("break"),
        Token::Continue => Some("continue"),
        Token::Return => Some("return"),
        Token::Try => Some("try"),
        Token::Catch => Some("catch"),
        Token::Finally => Some("finally"),
        Token::Throw => Some("throw"),
        Token::Import => Some("import"),
        Token::Export => Some("export"),
        Token::New => Some("new"),
        Token::This => Some("this"),
        Token::Super => Some("super"),
        Token::Typeof => Some("typeof"),
        Token::Instanceof => Some("instanceof"),
        Token::Delete => Some("delete"),
        Token::Void => Some("void"),
        Token::Debugger => Some("debugger"),
        Token::With => Some("with"),
        Token::Yield => Some("yield"),
        Token::In => Some("in"),
        Token::Extends => Some("extends"),
        Token::True => Some("true"),
        Token::False => Some("false"),
        Token::Null => Some("null"),
        _ => None,
    }
}
