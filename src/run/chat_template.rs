//! Chat prompt rendering (§6.3 `--chat-template {llama2|llama3|zephyr|chatml}`).
//!
//! Each variant renders a `(role, content)` message list into the flat
//! prompt text a model's tokenizer expects. The first message with
//! role `"system"` is treated specially by templates that have a
//! dedicated system slot; everything else is folded in turn order.

use crate::run::ChatTemplate as ChatTemplateTrait;
use crate::utils::error::{EngineError, Result};

pub struct Llama2Template;
pub struct Llama3Template;
pub struct ZephyrTemplate;
pub struct ChatMlTemplate;

impl ChatTemplateTrait for Llama2Template {
    fn render(&self, messages: &[(String, String)]) -> String {
        let system = messages.iter().find(|(role, _)| role == "system").map(|(_, content)| content.as_str());
        let mut out = String::new();
        let mut first_user = true;
        for (role, content) in messages {
            if role == "system" {
                continue;
            }
            if role == "user" {
                if first_user {
                    if let Some(sys) = system {
                        out.push_str(&format!("[INST] <<SYS>>\n{sys}\n<</SYS>>\n\n{content} [/INST]"));
                    } else {
                        out.push_str(&format!("[INST] {content} [/INST]"));
                    }
                    first_user = false;
                } else {
                    out.push_str(&format!(" [INST] {content} [/INST]"));
                }
            } else if role == "assistant" {
                out.push_str(&format!(" {content} </s><s>"));
            }
        }
        out
    }
}

impl ChatTemplateTrait for Llama3Template {
    fn render(&self, messages: &[(String, String)]) -> String {
        let mut out = String::new();
        for (role, content) in messages {
            out.push_str(&format!("<|start_header_id|>{role}<|end_header_id|>\n\n{content}<|eot_id|>"));
        }
        out.push_str("<|start_header_id|>assistant<|end_header_id|>\n\n");
        out
    }
}

impl ChatTemplateTrait for ZephyrTemplate {
    fn render(&self, messages: &[(String, String)]) -> String {
        let mut out = String::new();
        for (role, content) in messages {
            out.push_str(&format!("<|{role}|>\n{content}</s>\n"));
        }
        out.push_str("<|assistant|>\n");
        out
    }
}

impl ChatTemplateTrait for ChatMlTemplate {
    fn render(&self, messages: &[(String, String)]) -> String {
        let mut out = String::new();
        for (role, content) in messages {
            out.push_str(&format!("<|im_start|>{role}\n{content}<|im_end|>\n"));
        }
        out.push_str("<|im_start|>assistant\n");
        out
    }
}

/// Resolve the `--chat-template` flag / `node.chat_template` config
/// value into a concrete template.
pub fn resolve(name: &str) -> Result<Box<dyn ChatTemplateTrait>> {
    match name {
        "llama2" => Ok(Box::new(Llama2Template)),
        "llama3" => Ok(Box::new(Llama3Template)),
        "zephyr" => Ok(Box::new(ZephyrTemplate)),
        "chatml" => Ok(Box::new(ChatMlTemplate)),
        other => Err(EngineError::BadConfig(format!("unknown chat template '{other}', expected llama2|llama3|zephyr|chatml"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msgs() -> Vec<(String, String)> {
        vec![("system".to_string(), "be terse".to_string()), ("user".to_string(), "hi".to_string())]
    }

    #[test]
    fn llama2_folds_system_into_first_user_turn() {
        let rendered = Llama2Template.render(&msgs());
        assert!(rendered.starts_with("[INST] <<SYS>>"));
        assert!(rendered.contains("be terse"));
        assert!(rendered.ends_with("[/INST]"));
    }

    #[test]
    fn llama3_wraps_every_message_and_opens_assistant_turn() {
        let rendered = Llama3Template.render(&msgs());
        assert!(rendered.contains("<|start_header_id|>system<|end_header_id|>"));
        assert!(rendered.ends_with("<|start_header_id|>assistant<|end_header_id|>\n\n"));
    }

    #[test]
    fn chatml_wraps_with_im_start_im_end() {
        let rendered = ChatMlTemplate.render(&msgs());
        assert!(rendered.contains("<|im_start|>system\nbe terse<|im_end|>"));
    }

    #[test]
    fn resolve_rejects_unknown_name() {
        assert!(resolve("bogus").is_err());
    }

    #[test]
    fn resolve_accepts_all_four_names() {
        for name in ["llama2", "llama3", "zephyr", "chatml"] {
            assert!(resolve(name).is_ok());
        }
    }
}
