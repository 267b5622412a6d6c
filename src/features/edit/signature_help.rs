use super::completion::{in_comment_or_string, member_base};
use crate::core::LookupHelper;
use crate::features::{from_lsp_position, text_before};
use crate::syntax::{Lexer, Parser};
use crate::types::{Entity, Signature, Type};
use lsp_types::*;

/// Provides the signature of the call the cursor is in
#[derive(Clone, Default)]
pub struct SignatureHelpProvider;

impl SignatureHelpProvider {
    pub fn new() -> Self {
        Self
    }

    pub async fn provide(&self, helper: &LookupHelper, position: Position) -> Option<SignatureHelp> {
        let line = helper.document().text_document.line(position.line)?;
        let call = open_call(&text_before(line, position.character))?;

        let expression = Parser::new(Lexer::new(&call.callee).tokenize().0).parse_expression();
        let map = helper.get_type_map().await;
        let entity = map.resolve(&expression, map.scope_at(from_lsp_position(position)))?;
        let Type::Function(signature) = &entity.ty else {
            tracing::debug!("`{}` is not callable", call.callee);
            return None;
        };

        let active = call.argument as u32;
        Some(SignatureHelp {
            signatures: vec![Self::signature_information(&entity, signature, active)],
            active_signature: Some(0),
            active_parameter: Some(active),
        })
    }

    fn signature_information(entity: &Entity, signature: &Signature, active: u32) -> SignatureInformation {
        let label = entity.signature_label();
        let parameters = parameter_offsets(&label, &entity.name, signature)
            .into_iter()
            .map(|offsets| ParameterInformation {
                label: ParameterLabel::LabelOffsets(offsets),
                documentation: None,
            })
            .collect();

        SignatureInformation {
            label,
            documentation: entity
                .documentation
                .map(|doc| Documentation::String(doc.to_string())),
            parameters: Some(parameters),
            active_parameter: Some(active),
        }
    }
}

/// The innermost call left open before the cursor.
#[derive(Debug, PartialEq)]
struct OpenCall {
    /// Source text of the called expression, e.g. `lib.add`.
    callee: String,
    /// Zero-based index of the argument being typed.
    argument: usize,
}

fn open_call(before_cursor: &str) -> Option<OpenCall> {
    if in_comment_or_string(before_cursor) {
        return None;
    }

    // (byte offset of the opening bracket, bracket, commas seen inside)
    let mut open: Vec<(usize, char, usize)> = Vec::new();
    let mut in_string = false;
    for (offset, ch) in before_cursor.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            _ if in_string => {}
            '(' | '[' | '{' => open.push((offset, ch, 0)),
            ')' | ']' | '}' => {
                open.pop();
            }
            ',' => {
                if let Some(innermost) = open.last_mut() {
                    innermost.2 += 1;
                }
            }
            _ => {}
        }
    }

    let (offset, _, argument) = open.into_iter().rev().find(|(_, bracket, _)| *bracket == '(')?;
    let callee = member_base(before_cursor[..offset].trim_end())?;
    Some(OpenCall { callee, argument })
}

/// UTF-16 offsets of each parameter within a label rendered by
/// [`Entity::signature_label`].
fn parameter_offsets(label: &str, name: &str, signature: &Signature) -> Vec<[u32; 2]> {
    let opening = format!("{name}(");
    let Some(start) = label.find(&opening) else {
        return Vec::new();
    };

    let mut offsets = Vec::with_capacity(signature.parameters.len());
    let mut cursor = start + opening.len();
    for parameter in &signature.parameters {
        let Some(found) = label[cursor..].find(parameter.name.as_str()) else {
            break;
        };
        let from = cursor + found;
        let to = from + parameter.name.len();
        offsets.push([utf16_len(&label[..from]), utf16_len(&label[..to])]);
        cursor = to;
    }
    offsets
}

fn utf16_len(text: &str) -> u32 {
    text.encode_utf16().count() as u32
}
