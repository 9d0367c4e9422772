//! Schema-typed text-format parser.
//!
//! Parses one document into a [`Document`]: the `includes` directives found at
//! its top level and a [`MessageNode`] of its inline fields. Field names and
//! literal types are checked against the registry as they are read.

use super::lexer::{Pos, Spanned, Token, tokenize};
use super::merge::merge_message;
use super::node::{ConfigNode, Document, IncludeDirective, MessageNode, Value};
use crate::schema::{
    FieldDescriptor, FieldType, INCLUDES_FIELD, MessageDescriptor, PrimitiveType, SchemaRegistry,
};
use thiserror::Error;

/// Errors raised while parsing a single document.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("line {line}, column {column}: unknown field '{field}' in message {message}")]
    UnknownField {
        field: String,
        message: String,
        line: usize,
        column: usize,
    },

    #[error("line {line}, column {column}: field '{field}': {reason}")]
    TypeMismatch {
        field: String,
        reason: String,
        line: usize,
        column: usize,
    },

    #[error("line {line}, column {column}: {reason}")]
    MalformedText {
        reason: String,
        line: usize,
        column: usize,
    },

    #[error(
        "line {line}, column {column}: field '{field}' conflicts with '{other}' already set in oneof '{group}'"
    )]
    OneofConflict {
        field: String,
        other: String,
        group: String,
        line: usize,
        column: usize,
    },
}

/// Parse a whole document as message `type_name`.
pub fn parse_document(
    text: &str,
    type_name: &str,
    schema: &SchemaRegistry,
) -> Result<Document, ParseError> {
    let descriptor = schema
        .message(type_name)
        .ok_or_else(|| ParseError::MalformedText {
            reason: format!("unknown message type {}", type_name),
            line: 1,
            column: 1,
        })?;

    let mut parser = Parser::new(tokenize(text)?, schema);
    let mut includes = Vec::new();
    let mut body = MessageNode::new(type_name);

    loop {
        match parser.peek() {
            Token::Eof => break,
            Token::Ident(name) if name == INCLUDES_FIELD => parser.includes(&mut includes)?,
            _ => parser.field(descriptor, &mut body)?,
        }
        parser.skip_separator();
    }

    apply_defaults(&mut body, descriptor);
    Ok(Document { includes, body })
}

/// Parse a single value for `field`, as given on a command line.
///
/// String fields accept unquoted text verbatim. Repeated fields accept a
/// `[...]` list or a single element.
pub fn parse_value(
    text: &str,
    field: &FieldDescriptor,
    schema: &SchemaRegistry,
) -> Result<ConfigNode, ParseError> {
    if field.is_message() {
        return Err(ParseError::TypeMismatch {
            field: field.name.clone(),
            reason: "a message field cannot be assigned a single value".to_string(),
            line: 1,
            column: 1,
        });
    }

    let trimmed = text.trim();
    let quoted = trimmed.starts_with('"') || trimmed.starts_with('\'') || trimmed.starts_with('[');
    if field.field_type == FieldType::Primitive(PrimitiveType::String) && !quoted {
        let value = ConfigNode::explicit(Value::Str(text.to_string()));
        return Ok(if field.is_repeated() {
            ConfigNode::Repeated(vec![value])
        } else {
            value
        });
    }

    let mut parser = Parser::new(tokenize(text)?, schema);
    let node = if field.is_repeated() {
        if matches!(parser.peek(), Token::Symbol('[')) {
            ConfigNode::Repeated(parser.scalar_list(field)?)
        } else {
            ConfigNode::Repeated(vec![ConfigNode::explicit(parser.scalar(field)?)])
        }
    } else {
        ConfigNode::explicit(parser.scalar(field)?)
    };

    if !matches!(parser.peek(), Token::Eof) {
        let pos = parser.pos();
        return Err(parser.malformed(
            pos,
            format!("unexpected {} after value", parser.peek().describe()),
        ));
    }
    Ok(node)
}

/// Insert schema defaults for absent singular non-oneof fields of `node`.
pub(crate) fn apply_defaults(node: &mut MessageNode, descriptor: &MessageDescriptor) {
    for field in &descriptor.fields {
        if field.oneof.is_some() || field.is_repeated() {
            continue;
        }
        if let Some(default) = &field.default
            && !node.fields.contains_key(&field.name)
        {
            node.fields
                .insert(field.name.clone(), ConfigNode::default_value(default.clone()));
        }
    }
}

/// Apply defaults in `node` and every message below it.
pub(crate) fn fill_defaults(node: &mut MessageNode, schema: &SchemaRegistry) {
    if let Some(descriptor) = schema.message(node.type_name()) {
        apply_defaults(node, descriptor);
    }
    for child in node.fields.values_mut() {
        fill_node_defaults(child, schema);
    }
}

fn fill_node_defaults(node: &mut ConfigNode, schema: &SchemaRegistry) {
    match node {
        ConfigNode::Message(m) => fill_defaults(m, schema),
        ConfigNode::Oneof(o) => fill_node_defaults(&mut o.value, schema),
        ConfigNode::Repeated(items) => {
            for item in items {
                fill_node_defaults(item, schema);
            }
        }
        ConfigNode::Scalar(_) => {}
    }
}

struct Parser<'s> {
    tokens: Vec<Spanned>,
    idx: usize,
    schema: &'s SchemaRegistry,
}

impl<'s> Parser<'s> {
    fn new(tokens: Vec<Spanned>, schema: &'s SchemaRegistry) -> Self {
        Self {
            tokens,
            idx: 0,
            schema,
        }
    }

    fn peek(&self) -> &Token {
        // `tokenize` always ends with Eof and `next` never moves past it.
        &self.tokens[self.idx].token
    }

    fn pos(&self) -> Pos {
        self.tokens[self.idx].pos
    }

    fn next(&mut self) -> Spanned {
        let current = self.tokens[self.idx].clone();
        if self.idx + 1 < self.tokens.len() {
            self.idx += 1;
        }
        current
    }

    fn malformed(&self, pos: Pos, reason: impl Into<String>) -> ParseError {
        ParseError::MalformedText {
            reason: reason.into(),
            line: pos.line,
            column: pos.column,
        }
    }

    fn mismatch(&self, field: &FieldDescriptor, pos: Pos, reason: impl Into<String>) -> ParseError {
        ParseError::TypeMismatch {
            field: field.name.clone(),
            reason: reason.into(),
            line: pos.line,
            column: pos.column,
        }
    }

    fn eat(&mut self, symbol: char) -> bool {
        if *self.peek() == Token::Symbol(symbol) {
            self.next();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, symbol: char) -> Result<(), ParseError> {
        let pos = self.pos();
        if self.eat(symbol) {
            Ok(())
        } else {
            Err(self.malformed(
                pos,
                format!("expected '{}', found {}", symbol, self.peek().describe()),
            ))
        }
    }

    fn skip_separator(&mut self) {
        if !self.eat(',') {
            self.eat(';');
        }
    }

    fn ident(&mut self) -> Result<(String, Pos), ParseError> {
        let Spanned { token, pos } = self.next();
        match token {
            Token::Ident(name) => Ok((name, pos)),
            other => Err(self.malformed(
                pos,
                format!("expected field name, found {}", other.describe()),
            )),
        }
    }

    /// `includes { path: "..." mount: "..." }` or `includes: [{...}, ...]`.
    fn includes(&mut self, out: &mut Vec<IncludeDirective>) -> Result<(), ParseError> {
        self.next();
        self.eat(':');
        if self.eat('[') {
            if self.eat(']') {
                return Ok(());
            }
            loop {
                out.push(self.include_entry()?);
                if self.eat(']') {
                    return Ok(());
                }
                self.expect(',')?;
            }
        }
        out.push(self.include_entry()?);
        Ok(())
    }

    fn include_entry(&mut self) -> Result<IncludeDirective, ParseError> {
        let open_pos = self.pos();
        let close = self.open_brace()?;
        let mut path = None;
        let mut mount = String::new();
        while !self.eat(close) {
            let (name, pos) = self.ident()?;
            self.expect(':')?;
            let value = self.string_literal()?;
            match name.as_str() {
                "path" => path = Some(value),
                "mount" => mount = value,
                _ => {
                    return Err(ParseError::UnknownField {
                        field: name,
                        message: "Include".to_string(),
                        line: pos.line,
                        column: pos.column,
                    });
                }
            }
            self.skip_separator();
        }
        let path = path.ok_or_else(|| self.malformed(open_pos, "include without a path"))?;
        Ok(IncludeDirective { path, mount })
    }

    fn open_brace(&mut self) -> Result<char, ParseError> {
        let pos = self.pos();
        if self.eat('{') {
            Ok('}')
        } else if self.eat('<') {
            Ok('>')
        } else {
            Err(self.malformed(
                pos,
                format!("expected '{{', found {}", self.peek().describe()),
            ))
        }
    }

    fn string_literal(&mut self) -> Result<String, ParseError> {
        let Spanned { token, pos } = self.next();
        let Token::Str(mut s) = token else {
            return Err(self.malformed(
                pos,
                format!("expected string, found {}", token.describe()),
            ));
        };
        while let Token::Str(more) = self.peek() {
            s.push_str(more);
            self.next();
        }
        Ok(s)
    }

    fn message_body(&mut self, type_name: &str, close: char) -> Result<MessageNode, ParseError> {
        let pos = self.pos();
        let schema = self.schema;
        let descriptor = schema
            .message(type_name)
            .ok_or_else(|| self.malformed(pos, format!("unknown message type {}", type_name)))?;
        let mut node = MessageNode::new(type_name);
        loop {
            if self.eat(close) {
                break;
            }
            if matches!(self.peek(), Token::Eof) {
                let pos = self.pos();
                return Err(self.malformed(pos, format!("expected '{}' before end of input", close)));
            }
            self.field(descriptor, &mut node)?;
            self.skip_separator();
        }
        apply_defaults(&mut node, descriptor);
        Ok(node)
    }

    fn field(
        &mut self,
        descriptor: &MessageDescriptor,
        node: &mut MessageNode,
    ) -> Result<(), ParseError> {
        let (name, pos) = self.ident()?;
        let field = descriptor
            .field(&name)
            .ok_or_else(|| ParseError::UnknownField {
                field: name.clone(),
                message: descriptor.name.clone(),
                line: pos.line,
                column: pos.column,
            })?;

        if let FieldType::Message(type_name) = &field.field_type {
            self.eat(':');
            if self.eat('[') {
                if !field.is_repeated() {
                    return Err(self.mismatch(field, pos, "list given for a singular field"));
                }
                let mut items = Vec::new();
                if !self.eat(']') {
                    loop {
                        let close = self.open_brace()?;
                        items.push(ConfigNode::Message(self.message_body(type_name, close)?));
                        if self.eat(']') {
                            break;
                        }
                        self.expect(',')?;
                    }
                }
                return self.push_repeated(node, field, items);
            }
            let close = self.open_brace()?;
            let value = ConfigNode::Message(self.message_body(type_name, close)?);
            if field.is_repeated() {
                return self.push_repeated(node, field, vec![value]);
            }
            return self.store_singular(descriptor, node, field, value, pos);
        }

        self.expect(':')?;
        if matches!(self.peek(), Token::Symbol('[')) {
            if !field.is_repeated() {
                return Err(self.mismatch(field, pos, "list given for a singular field"));
            }
            let items = self.scalar_list(field)?;
            return self.push_repeated(node, field, items);
        }
        let value = ConfigNode::explicit(self.scalar(field)?);
        if field.is_repeated() {
            return self.push_repeated(node, field, vec![value]);
        }
        self.store_singular(descriptor, node, field, value, pos)
    }

    fn push_repeated(
        &mut self,
        node: &mut MessageNode,
        field: &FieldDescriptor,
        items: Vec<ConfigNode>,
    ) -> Result<(), ParseError> {
        let entry = node
            .fields
            .entry(field.name.clone())
            .or_insert_with(|| ConfigNode::Repeated(Vec::new()));
        if let ConfigNode::Repeated(existing) = entry {
            existing.extend(items);
        }
        Ok(())
    }

    /// Store a singular value: a later scalar wins, a repeated message merges.
    fn store_singular(
        &mut self,
        descriptor: &MessageDescriptor,
        node: &mut MessageNode,
        field: &FieldDescriptor,
        value: ConfigNode,
        pos: Pos,
    ) -> Result<(), ParseError> {
        let key = match &field.oneof {
            Some(group) if !descriptor.is_selector(group) => {
                match node.fields.get_mut(group) {
                    Some(ConfigNode::Oneof(existing)) if existing.field != field.name => {
                        return Err(ParseError::OneofConflict {
                            field: field.name.clone(),
                            other: existing.field.clone(),
                            group: group.clone(),
                            line: pos.line,
                            column: pos.column,
                        });
                    }
                    Some(ConfigNode::Oneof(existing)) => {
                        return self.combine(&mut existing.value, value, pos);
                    }
                    _ => {
                        node.fields
                            .insert(group.clone(), ConfigNode::oneof(&field.name, value));
                        return Ok(());
                    }
                }
            }
            _ => field.name.clone(),
        };

        match node.fields.get_mut(&key) {
            Some(existing) => self.combine(existing, value, pos),
            None => {
                node.fields.insert(key, value);
                Ok(())
            }
        }
    }

    fn combine(
        &self,
        existing: &mut ConfigNode,
        value: ConfigNode,
        pos: Pos,
    ) -> Result<(), ParseError> {
        match (existing, value) {
            (ConfigNode::Message(base), ConfigNode::Message(incoming)) => {
                merge_message(base, incoming, self.schema)
                    .map_err(|e| self.malformed(pos, e.to_string()))
            }
            (slot, value) => {
                *slot = value;
                Ok(())
            }
        }
    }

    fn scalar_list(&mut self, field: &FieldDescriptor) -> Result<Vec<ConfigNode>, ParseError> {
        self.expect('[')?;
        let mut items = Vec::new();
        if self.eat(']') {
            return Ok(items);
        }
        loop {
            items.push(ConfigNode::explicit(self.scalar(field)?));
            if self.eat(']') {
                return Ok(items);
            }
            self.expect(',')?;
        }
    }

    fn scalar(&mut self, field: &FieldDescriptor) -> Result<Value, ParseError> {
        let pos = self.pos();
        let negative = self.eat('-');
        let expected = field.field_type.display_name().to_string();

        if let Token::Str(_) = self.peek() {
            let s = self.string_literal()?;
            return match &field.field_type {
                FieldType::Primitive(PrimitiveType::String) if !negative => Ok(Value::Str(s)),
                _ => Err(self.mismatch(field, pos, format!("expected {}, found string {:?}", expected, s))),
            };
        }

        let Spanned { token, .. } = self.next();
        let found = token.describe();
        let bad = |reason: Option<String>| {
            let reason = reason.unwrap_or_else(|| format!("expected {}, found {}", expected, found));
            ParseError::TypeMismatch {
                field: field.name.clone(),
                reason,
                line: pos.line,
                column: pos.column,
            }
        };

        match (&field.field_type, token) {
            (FieldType::Primitive(PrimitiveType::Bool), token) if !negative => match token {
                Token::Ident(s) if matches!(s.as_str(), "true" | "True" | "t") => Ok(Value::Bool(true)),
                Token::Ident(s) if matches!(s.as_str(), "false" | "False" | "f") => Ok(Value::Bool(false)),
                Token::Number(s) if s == "1" => Ok(Value::Bool(true)),
                Token::Number(s) if s == "0" => Ok(Value::Bool(false)),
                _ => Err(bad(None)),
            },
            (FieldType::Primitive(p @ (PrimitiveType::Int32 | PrimitiveType::Int64 | PrimitiveType::UInt32)), Token::Number(s)) => {
                let n = parse_int(&s, negative).ok_or_else(|| bad(None))?;
                let value = Value::Int(n);
                p.check(&value).map_err(|r| bad(Some(r)))?;
                Ok(value)
            }
            (FieldType::Primitive(p @ (PrimitiveType::Float | PrimitiveType::Double)), Token::Number(s)) => {
                let x = parse_float(&s).ok_or_else(|| bad(None))?;
                let value = Value::Float(if negative { -x } else { x });
                p.check(&value).map_err(|r| bad(Some(r)))?;
                Ok(value)
            }
            (FieldType::Primitive(PrimitiveType::Float | PrimitiveType::Double), Token::Ident(s)) => {
                let x = match s.to_ascii_lowercase().as_str() {
                    "inf" | "infinity" => f64::INFINITY,
                    "nan" => f64::NAN,
                    _ => return Err(bad(None)),
                };
                Ok(Value::Float(if negative { -x } else { x }))
            }
            (FieldType::Enum(enum_name), Token::Ident(symbol)) if !negative => {
                let known = self
                    .schema
                    .enum_type(enum_name)
                    .is_some_and(|e| e.number(&symbol).is_some());
                if known {
                    Ok(Value::Enum(symbol))
                } else {
                    Err(bad(Some(format!("'{}' is not a value of enum {}", symbol, enum_name))))
                }
            }
            (FieldType::Enum(enum_name), Token::Number(s)) => {
                let symbol = parse_int(&s, negative)
                    .and_then(|n| i32::try_from(n).ok())
                    .and_then(|n| self.schema.enum_type(enum_name)?.symbol(n))
                    .ok_or_else(|| bad(Some(format!("{} is not a value of enum {}", s, enum_name))))?;
                Ok(Value::Enum(symbol.to_string()))
            }
            _ => Err(bad(None)),
        }
    }
}

fn parse_int(s: &str, negative: bool) -> Option<i64> {
    let magnitude = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => i128::from_str_radix(hex, 16).ok()?,
        None => s.parse::<i128>().ok()?,
    };
    i64::try_from(if negative { -magnitude } else { magnitude }).ok()
}

fn parse_float(s: &str) -> Option<f64> {
    if s.starts_with("0x") || s.starts_with("0X") {
        return parse_int(s, false).map(|n| n as f64);
    }
    let s = s.strip_suffix(['f', 'F']).unwrap_or(s);
    s.parse::<f64>().ok()
}
