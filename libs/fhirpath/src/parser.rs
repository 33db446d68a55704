//! FHIRPath parser
//!
//! Recursive descent over the token stream, following the grammar
//! precedence (lowest to highest): implies, or/xor, and, membership,
//! type (is/as), equality, inequality, union, additive, multiplicative,
//! polarity, indexer/invocation, term.
//!
//! All lexical diagnostics plus the first parse failure are aggregated
//! into one `SyntaxReport`, so a caller sees every broken token at once.

use crate::ast::*;
use crate::error::{Error, Result, SyntaxIssue, SyntaxReport};
use crate::lexer::Lexer;
use crate::temporal_parse::{parse_date_parts, parse_datetime_parts, parse_time_parts};
use crate::token::{Token, TokenKind};
use rust_decimal::Decimal;
use std::str::FromStr;

const MAX_RECURSION_DEPTH: usize = 200;

/// Parse an expression source string into its AST.
pub fn parse(source: &str) -> Result<AstNode> {
    let (tokens, lex_errors) = Lexer::scan_all(source);

    let mut issues: Vec<SyntaxIssue> = lex_errors
        .iter()
        .map(|t| SyntaxIssue {
            line: t.line,
            column: t.column,
            message: t.text.clone(),
        })
        .collect();

    let mut parser = Parser::new(tokens);
    match parser.parse() {
        Ok(ast) if issues.is_empty() => Ok(ast),
        Ok(_) => Err(Error::Syntax(SyntaxReport { issues })),
        Err(issue) => {
            issues.push(issue);
            Err(Error::Syntax(SyntaxReport { issues }))
        }
    }
}

type ParseResult<T> = std::result::Result<T, SyntaxIssue>;

struct Parser {
    tokens: Vec<Token>,
    position: usize,
    recursion_depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
            recursion_depth: 0,
        }
    }

    fn current(&self) -> &Token {
        // scan_all always terminates the stream with Eof.
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
    }

    fn take(&mut self) -> Token {
        let token = self.current().clone();
        self.advance();
        token
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn at_one_of(&self, kinds: &[TokenKind]) -> bool {
        kinds.contains(&self.current().kind)
    }

    fn issue(&self, message: impl Into<String>) -> SyntaxIssue {
        let token = self.current();
        SyntaxIssue {
            line: token.line,
            column: token.column,
            message: message.into(),
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> ParseResult<Token> {
        if self.at(kind) {
            Ok(self.take())
        } else {
            Err(self.issue(format!("Expected {}, got {:?}", what, self.current().kind)))
        }
    }

    fn parse(&mut self) -> ParseResult<AstNode> {
        let expr = self.parse_expression()?;
        if !self.at(TokenKind::Eof) {
            return Err(self.issue(format!("Unexpected token {:?}", self.current().kind)));
        }
        Ok(expr)
    }

    fn enter(&mut self) -> ParseResult<()> {
        self.recursion_depth += 1;
        if self.recursion_depth > MAX_RECURSION_DEPTH {
            return Err(self.issue(format!(
                "Expression too deeply nested (max depth: {})",
                MAX_RECURSION_DEPTH
            )));
        }
        Ok(())
    }

    fn parse_expression(&mut self) -> ParseResult<AstNode> {
        self.enter()?;
        let expr = self.parse_implies_expression()?;
        self.recursion_depth -= 1;

        // Top-level terms are wrapped so the root is always an expression
        // alternative, mirroring the grammar's entry rule.
        match &expr {
            AstNode::InvocationTerm { .. }
            | AstNode::LiteralTerm { .. }
            | AstNode::ExternalConstantTerm { .. }
            | AstNode::ParenthesizedTerm { .. } => Ok(AstNode::TermExpression {
                term: Box::new(expr),
            }),
            _ => Ok(expr),
        }
    }

    fn parse_implies_expression(&mut self) -> ParseResult<AstNode> {
        let mut left = self.parse_or_expression()?;
        while self.at(TokenKind::Implies) {
            self.advance();
            let right = self.parse_or_expression()?;
            left = AstNode::ImpliesExpression {
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_or_expression(&mut self) -> ParseResult<AstNode> {
        let mut left = self.parse_and_expression()?;
        while self.at_one_of(&[TokenKind::Or, TokenKind::Xor]) {
            let operator = match self.take().kind {
                TokenKind::Or => OrOperator::Or,
                _ => OrOperator::Xor,
            };
            let right = self.parse_and_expression()?;
            left = AstNode::OrExpression {
                left: Box::new(left),
                operator,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and_expression(&mut self) -> ParseResult<AstNode> {
        let mut left = self.parse_membership_expression()?;
        while self.at(TokenKind::And) {
            self.advance();
            let right = self.parse_membership_expression()?;
            left = AstNode::AndExpression {
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_membership_expression(&mut self) -> ParseResult<AstNode> {
        let mut left = self.parse_type_expression()?;
        while self.at_one_of(&[TokenKind::In, TokenKind::Contains]) {
            let operator = match self.take().kind {
                TokenKind::In => MembershipOperator::In,
                _ => MembershipOperator::Contains,
            };
            let right = self.parse_type_expression()?;
            left = AstNode::MembershipExpression {
                left: Box::new(left),
                operator,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_type_expression(&mut self) -> ParseResult<AstNode> {
        // Type tests bind looser than comparison so that
        // `(1 | 1) is Integer` and `a = b is Boolean` read naturally.
        let mut left = self.parse_equality_expression()?;
        while self.at_one_of(&[TokenKind::Is, TokenKind::As]) {
            let operator = match self.take().kind {
                TokenKind::Is => TypeOperator::Is,
                _ => TypeOperator::As,
            };
            let type_specifier = self.parse_qualified_identifier()?;
            left = AstNode::TypeExpression {
                expression: Box::new(left),
                operator,
                type_specifier,
            };
        }
        Ok(left)
    }

    fn parse_equality_expression(&mut self) -> ParseResult<AstNode> {
        let mut left = self.parse_inequality_expression()?;
        while self.at_one_of(&[
            TokenKind::Equal,
            TokenKind::Equivalent,
            TokenKind::NotEqual,
            TokenKind::NotEquivalent,
        ]) {
            let operator = match self.take().kind {
                TokenKind::Equal => EqualityOperator::Equal,
                TokenKind::Equivalent => EqualityOperator::Equivalent,
                TokenKind::NotEqual => EqualityOperator::NotEqual,
                _ => EqualityOperator::NotEquivalent,
            };
            let right = self.parse_inequality_expression()?;
            left = AstNode::EqualityExpression {
                left: Box::new(left),
                operator,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_inequality_expression(&mut self) -> ParseResult<AstNode> {
        let mut left = self.parse_union_expression()?;
        while self.at_one_of(&[
            TokenKind::LessThan,
            TokenKind::LessThanOrEqual,
            TokenKind::GreaterThan,
            TokenKind::GreaterThanOrEqual,
        ]) {
            let operator = match self.take().kind {
                TokenKind::LessThan => InequalityOperator::LessThan,
                TokenKind::LessThanOrEqual => InequalityOperator::LessThanOrEqual,
                TokenKind::GreaterThan => InequalityOperator::GreaterThan,
                _ => InequalityOperator::GreaterThanOrEqual,
            };
            let right = self.parse_union_expression()?;
            left = AstNode::InequalityExpression {
                left: Box::new(left),
                operator,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_union_expression(&mut self) -> ParseResult<AstNode> {
        let mut left = self.parse_additive_expression()?;
        while self.at(TokenKind::Pipe) {
            self.advance();
            let right = self.parse_additive_expression()?;
            left = AstNode::UnionExpression {
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_additive_expression(&mut self) -> ParseResult<AstNode> {
        let mut left = self.parse_multiplicative_expression()?;
        while self.at_one_of(&[TokenKind::Plus, TokenKind::Minus, TokenKind::Ampersand]) {
            let operator = match self.take().kind {
                TokenKind::Plus => AdditiveOperator::Plus,
                TokenKind::Minus => AdditiveOperator::Minus,
                _ => AdditiveOperator::Concat,
            };
            let right = self.parse_multiplicative_expression()?;
            left = AstNode::AdditiveExpression {
                left: Box::new(left),
                operator,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_multiplicative_expression(&mut self) -> ParseResult<AstNode> {
        let mut left = self.parse_polarity_expression()?;
        while self.at_one_of(&[
            TokenKind::Multiply,
            TokenKind::Divide,
            TokenKind::Div,
            TokenKind::Mod,
        ]) {
            let operator = match self.take().kind {
                TokenKind::Multiply => MultiplicativeOperator::Multiply,
                TokenKind::Divide => MultiplicativeOperator::Divide,
                TokenKind::Div => MultiplicativeOperator::Div,
                _ => MultiplicativeOperator::Mod,
            };
            let right = self.parse_polarity_expression()?;
            left = AstNode::MultiplicativeExpression {
                left: Box::new(left),
                operator,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_polarity_expression(&mut self) -> ParseResult<AstNode> {
        if !self.at_one_of(&[TokenKind::Plus, TokenKind::Minus]) {
            return self.parse_postfix_expression();
        }

        let is_minus = self.take().kind == TokenKind::Minus;

        // Fold a minus into a following numeric literal (including its
        // quantity unit) so that `-5.single()` and `-3 'mg'` parse as
        // literals rather than polarity wrappers.
        if is_minus && self.at_one_of(&[TokenKind::NumberLiteral, TokenKind::LongNumberLiteral]) {
            let token = self.take();
            let unit = self.parse_quantity_unit()?;
            let text = format!("-{}", token.text);

            let literal = match token.kind {
                TokenKind::NumberLiteral => self.number_literal(&text, unit)?,
                _ => {
                    let value = i64::from_str(&text)
                        .map_err(|e| self.issue(format!("Invalid long number: {}", e)))?;
                    match unit {
                        Some(unit) => AstNode::QuantityLiteral {
                            value: Decimal::from(value),
                            unit,
                        },
                        None => AstNode::LongNumberLiteral(value),
                    }
                }
            };
            let term = AstNode::LiteralTerm {
                literal: Box::new(literal),
            };
            return self.parse_postfix_from(term);
        }

        let operator = if is_minus {
            PolarityOperator::Minus
        } else {
            PolarityOperator::Plus
        };
        let expression = self.parse_polarity_expression()?;
        Ok(AstNode::PolarityExpression {
            operator,
            expression: Box::new(expression),
        })
    }

    /// Indexers and dotted invocations, left-associative after a term.
    fn parse_postfix_expression(&mut self) -> ParseResult<AstNode> {
        let term = self.parse_term()?;
        self.parse_postfix_from(term)
    }

    fn parse_postfix_from(&mut self, mut expr: AstNode) -> ParseResult<AstNode> {
        loop {
            if self.at(TokenKind::Dot) {
                self.advance();
                let invocation = self.parse_invocation()?;
                expr = AstNode::InvocationExpression {
                    expression: Box::new(expr),
                    invocation: Box::new(invocation),
                };
            } else if self.at(TokenKind::OpenBracket) {
                self.advance();
                let index = self.parse_expression()?;
                self.expect(TokenKind::CloseBracket, "']'")?;
                expr = AstNode::IndexerExpression {
                    collection: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_term(&mut self) -> ParseResult<AstNode> {
        match self.current().kind {
            TokenKind::OpenParen => {
                self.advance();
                let expression = self.parse_expression()?;
                self.expect(TokenKind::CloseParen, "')'")?;
                Ok(AstNode::ParenthesizedTerm {
                    expression: Box::new(expression),
                })
            }
            TokenKind::ExternalConstant => {
                let token = self.take();
                Ok(AstNode::ExternalConstantTerm {
                    constant: token.text,
                })
            }
            TokenKind::BooleanLiteral
            | TokenKind::StringLiteral
            | TokenKind::NumberLiteral
            | TokenKind::LongNumberLiteral
            | TokenKind::DateLiteral
            | TokenKind::DateTimeLiteral
            | TokenKind::TimeLiteral
            | TokenKind::OpenBrace => {
                let literal = self.parse_literal()?;
                Ok(AstNode::LiteralTerm {
                    literal: Box::new(literal),
                })
            }
            _ => {
                let invocation = self.parse_invocation()?;
                Ok(AstNode::InvocationTerm {
                    invocation: Box::new(invocation),
                })
            }
        }
    }

    fn parse_literal(&mut self) -> ParseResult<AstNode> {
        match self.current().kind {
            TokenKind::OpenBrace => {
                self.advance();
                if self.at(TokenKind::CloseBrace) {
                    self.advance();
                    Ok(AstNode::NullLiteral)
                } else {
                    Err(self.issue("Expected '}' after '{'"))
                }
            }
            TokenKind::BooleanLiteral => {
                let token = self.take();
                Ok(AstNode::BooleanLiteral(token.text == "true"))
            }
            TokenKind::StringLiteral => {
                let token = self.take();
                Ok(AstNode::StringLiteral(token.text))
            }
            TokenKind::NumberLiteral => {
                let token = self.take();
                let unit = self.parse_quantity_unit()?;
                self.number_literal(&token.text, unit)
            }
            TokenKind::LongNumberLiteral => {
                let token = self.take();
                let value = i64::from_str(&token.text)
                    .map_err(|e| self.issue(format!("Invalid long number: {}", e)))?;
                Ok(AstNode::LongNumberLiteral(value))
            }
            TokenKind::DateLiteral => {
                let token = self.take();
                let (date, precision) = parse_date_parts(&token.text).ok_or_else(|| SyntaxIssue {
                    line: token.line,
                    column: token.column,
                    message: format!("Invalid date literal '@{}'", token.text),
                })?;
                Ok(AstNode::DateLiteral(date, precision))
            }
            TokenKind::DateTimeLiteral => {
                let token = self.take();
                let (dt, precision, offset) =
                    parse_datetime_parts(&token.text).ok_or_else(|| SyntaxIssue {
                        line: token.line,
                        column: token.column,
                        message: format!("Invalid dateTime literal '@{}'", token.text),
                    })?;
                Ok(AstNode::DateTimeLiteral(dt, precision, offset))
            }
            TokenKind::TimeLiteral => {
                let token = self.take();
                let (time, precision) =
                    parse_time_parts(&token.text).ok_or_else(|| SyntaxIssue {
                        line: token.line,
                        column: token.column,
                        message: format!("Invalid time literal '@T{}'", token.text),
                    })?;
                Ok(AstNode::TimeLiteral(time, precision))
            }
            other => Err(self.issue(format!("Expected a literal, got {:?}", other))),
        }
    }

    fn number_literal(&mut self, text: &str, unit: Option<String>) -> ParseResult<AstNode> {
        if let Some(unit) = unit {
            let value = Decimal::from_str(text)
                .map_err(|e| self.issue(format!("Invalid number: {}", e)))?;
            return Ok(AstNode::QuantityLiteral { value, unit });
        }
        if text.contains('.') {
            let value = Decimal::from_str(text)
                .map_err(|e| self.issue(format!("Invalid number: {}", e)))?;
            Ok(AstNode::NumberLiteral(value))
        } else {
            let value = i64::from_str(text)
                .map_err(|e| self.issue(format!("Invalid integer: {}", e)))?;
            Ok(AstNode::IntegerLiteral(value))
        }
    }

    /// Optional quantity unit after a number: `'mg'` or a calendar word.
    fn parse_quantity_unit(&mut self) -> ParseResult<Option<String>> {
        if self.at(TokenKind::StringLiteral) {
            return Ok(Some(self.take().text));
        }
        if self.at(TokenKind::Identifier)
            && crate::value::CalendarUnit::parse(&self.current().text).is_some()
        {
            return Ok(Some(self.take().text));
        }
        Ok(None)
    }

    fn parse_invocation(&mut self) -> ParseResult<AstNode> {
        match self.current().kind {
            TokenKind::This => {
                self.advance();
                Ok(AstNode::ThisInvocation)
            }
            TokenKind::Index => {
                self.advance();
                Ok(AstNode::IndexInvocation)
            }
            TokenKind::Total => {
                self.advance();
                Ok(AstNode::TotalInvocation)
            }
            // Operator keywords double as function names
            // (`contains()`, `in()`, `as()`, `is()`).
            TokenKind::Identifier
            | TokenKind::DelimitedIdentifier
            | TokenKind::Contains
            | TokenKind::In
            | TokenKind::As
            | TokenKind::Is => {
                let name = self.take().text;
                if self.at(TokenKind::OpenParen) {
                    self.advance();
                    let mut parameters = Vec::new();
                    if !self.at(TokenKind::CloseParen) {
                        loop {
                            parameters.push(self.parse_expression()?);
                            if self.at(TokenKind::Comma) {
                                self.advance();
                            } else {
                                break;
                            }
                        }
                    }
                    self.expect(TokenKind::CloseParen, "')'")?;
                    Ok(AstNode::FunctionInvocation {
                        function_name: name,
                        parameters,
                    })
                } else {
                    Ok(AstNode::MemberInvocation { identifier: name })
                }
            }
            other => Err(self.issue(format!("Expected an invocation, got {:?}", other))),
        }
    }

    fn parse_qualified_identifier(&mut self) -> ParseResult<QualifiedIdentifier> {
        let mut parts = Vec::new();
        if !self.at_one_of(&[TokenKind::Identifier, TokenKind::DelimitedIdentifier]) {
            return Err(self.issue("Expected a type name"));
        }
        parts.push(self.take().text);
        while self.at(TokenKind::Dot) {
            self.advance();
            if !self.at_one_of(&[TokenKind::Identifier, TokenKind::DelimitedIdentifier]) {
                return Err(self.issue("Expected an identifier after '.'"));
            }
            parts.push(self.take().text);
        }
        Ok(QualifiedIdentifier::new(parts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_identifier_wraps_as_term() {
        let ast = parse("Patient").unwrap();
        match &ast {
            AstNode::TermExpression { term } => match term.as_ref() {
                AstNode::InvocationTerm { invocation } => {
                    assert!(matches!(invocation.as_ref(), AstNode::MemberInvocation { .. }));
                }
                other => panic!("expected InvocationTerm, got {:?}", other),
            },
            other => panic!("expected TermExpression, got {:?}", other),
        }
    }

    #[test]
    fn dotted_navigation() {
        let ast = parse("Patient.name.given").unwrap();
        assert!(matches!(ast, AstNode::InvocationExpression { .. }));
    }

    #[test]
    fn precedence_mul_over_add() {
        // 2 + 3 * 4 parses as 2 + (3 * 4)
        let ast = parse("2 + 3 * 4").unwrap();
        match ast {
            AstNode::AdditiveExpression { right, .. } => {
                assert!(matches!(*right, AstNode::MultiplicativeExpression { .. }));
            }
            other => panic!("expected AdditiveExpression, got {:?}", other),
        }
    }

    #[test]
    fn union_binds_tighter_than_comparison() {
        let ast = parse("(1 | 2) = (1 | 2)").unwrap();
        assert!(matches!(ast, AstNode::EqualityExpression { .. }));
    }

    #[test]
    fn type_expression_after_union() {
        let ast = parse("(1 | 1) is Integer").unwrap();
        assert!(matches!(ast, AstNode::TypeExpression { .. }));
    }

    #[test]
    fn function_with_arguments() {
        let ast = parse("name.where(use = 'official')").unwrap();
        assert!(matches!(ast, AstNode::InvocationExpression { .. }));
    }

    #[test]
    fn keyword_function_names() {
        assert!(parse("name.contains('x')").is_ok());
        assert!(parse("value.as(Quantity)").is_ok());
    }

    #[test]
    fn indexer_then_navigation() {
        let ast = parse("name[0].given").unwrap();
        assert!(matches!(ast, AstNode::InvocationExpression { .. }));
    }

    #[test]
    fn quantity_literals() {
        let ast = parse("4.5 'mg'").unwrap();
        match &ast {
            AstNode::TermExpression { term } => match term.as_ref() {
                AstNode::LiteralTerm { literal } => {
                    assert!(matches!(literal.as_ref(), AstNode::QuantityLiteral { .. }));
                }
                other => panic!("expected LiteralTerm, got {:?}", other),
            },
            other => panic!("expected TermExpression, got {:?}", other),
        }

        // Calendar word unit
        assert!(parse("1 year").is_ok());
        assert!(parse("4 days").is_ok());
    }

    #[test]
    fn negative_literal_folding() {
        let ast = parse("-5").unwrap();
        match &ast {
            AstNode::TermExpression { term } => match term.as_ref() {
                AstNode::LiteralTerm { literal } => {
                    assert_eq!(literal.as_ref(), &AstNode::IntegerLiteral(-5));
                }
                other => panic!("expected LiteralTerm, got {:?}", other),
            },
            other => panic!("expected TermExpression, got {:?}", other),
        }

        // Method call on a folded negative literal
        assert!(parse("(-5).abs()").is_ok());
        assert!(parse("-5.abs()").is_ok());
    }

    #[test]
    fn empty_collection_literal() {
        let ast = parse("{}").unwrap();
        match &ast {
            AstNode::TermExpression { term } => {
                assert!(matches!(term.as_ref(), AstNode::LiteralTerm { .. }));
            }
            other => panic!("expected TermExpression, got {:?}", other),
        }
    }

    #[test]
    fn date_and_long_literals() {
        assert!(parse("@2014-05-21T14:30").is_ok());
        assert!(parse("@T14:30:14.559").is_ok());
        assert!(parse("7L").is_ok());
    }

    #[test]
    fn external_constant_term() {
        let ast = parse("%resource.name").unwrap();
        assert!(matches!(ast, AstNode::InvocationExpression { .. }));
    }

    #[test]
    fn dollar_variables() {
        assert!(parse("name.where($this = 'x')").is_ok());
        assert!(parse("name.select($index)").is_ok());
        assert!(parse("value.aggregate($total + $this, 0)").is_ok());
    }

    #[test]
    fn error_reports_location() {
        let err = parse("name.").unwrap_err();
        match err {
            Error::Syntax(report) => {
                assert_eq!(report.issues.len(), 1);
                assert_eq!(report.issues[0].line, 1);
                assert!(report.issues[0].column > 1);
            }
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn accumulates_multiple_lexer_diagnostics() {
        let err = parse("name # given ^ family").unwrap_err();
        match err {
            Error::Syntax(report) => {
                assert!(report.issues.len() >= 2);
            }
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn deep_nesting_is_capped() {
        let source = format!("{}1{}", "(".repeat(300), ")".repeat(300));
        assert!(parse(&source).is_err());
    }
}
