//! 内容生成服务 - 业务能力层
//!
//! 只负责"讲解生成"与"配图生成"两个能力，不关心会话流程。
//!
//! ## 技术栈
//! - 讲解：`async-openai` 聊天补全（兼容 OpenAI API 的服务）
//! - 配图：OpenAI 兼容的 /images/generations 端点（reqwest）
//! - 每次调用都处在"外部取消信号 + 默认超时"组成的截止期之内，
//!   核心不做自动重试，重试永远由用户在会话里发起

use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, GenerationError};
use crate::models::ExplanationSet;
use crate::utils::logging::truncate_text;

/// 一次生成调用的输入：词条的固定字段 + 本次会话的上下文
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub reading: &'a str,
    pub expression: Option<&'a str>,
    /// 词条的通用上下文
    pub general_context: Option<&'a str>,
    /// 本次尝试输入的上下文
    pub session_context: Option<&'a str>,
}

/// 配图生成结果
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    /// 不带点的扩展名，如 "png"
    pub extension: String,
    /// 服务端实际使用的提示词
    pub prompt: Option<String>,
}

/// 内容生成能力
///
/// 窄接口：会话流程只依赖这两个操作，测试用脚本替身实现
#[allow(async_fn_in_trait)]
pub trait GenerationProvider {
    /// 生成一套完整的三级讲解
    async fn produce_explanations(
        &self,
        request: &GenerationRequest<'_>,
        cancel: &CancellationToken,
    ) -> AppResult<ExplanationSet>;

    /// 生成一张配图
    async fn produce_image(
        &self,
        request: &GenerationRequest<'_>,
        cancel: &CancellationToken,
    ) -> AppResult<GeneratedImage>;
}

/// 基于 LLM API 的生成服务
pub struct LlmGenerationService {
    client: Client<OpenAIConfig>,
    http: reqwest::Client,
    api_key: String,
    api_base_url: String,
    model_name: String,
    image_model_name: String,
    timeout: Duration,
}

impl LlmGenerationService {
    pub fn new(config: &Config) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            http: reqwest::Client::new(),
            api_key: config.llm_api_key.clone(),
            api_base_url: config.llm_api_base_url.clone(),
            model_name: config.llm_model_name.clone(),
            image_model_name: config.image_model_name.clone(),
            timeout: Duration::from_secs(config.generation_timeout_secs),
        }
    }

    /// 把调用包进截止期：外部取消信号与默认超时任意一个先触发都会中止
    async fn with_deadline<T>(
        &self,
        cancel: &CancellationToken,
        call: impl std::future::Future<Output = AppResult<T>>,
    ) -> AppResult<T> {
        tokio::select! {
            _ = cancel.cancelled() => {
                warn!("⚠️ 生成调用被外部取消");
                Err(AppError::Generation(GenerationError::Cancelled))
            }
            _ = tokio::time::sleep(self.timeout) => {
                warn!("⚠️ 生成调用超时 ({} 秒)", self.timeout.as_secs());
                Err(AppError::Generation(GenerationError::DeadlineExceeded {
                    seconds: self.timeout.as_secs(),
                }))
            }
            result = call => result,
        }
    }

    /// 构建讲解生成的消息
    ///
    /// 返回 (user_message, system_message)
    fn build_explanation_messages(request: &GenerationRequest<'_>) -> (String, String) {
        let system_message = "你是一名日语词汇讲解助手。针对给定的词条生成三档难度的日语讲解：\
                              easy（面向初学者的一句话）、moderate（常用语境与搭配）、\
                              advanced（细微语感与近义辨析）。\
                              只返回一个 JSON 对象，键为 easy、moderate、advanced，值为讲解文本，\
                              不要返回任何其他内容。"
            .to_string();

        let mut user_message = format!("读音：{}", request.reading);
        if let Some(expression) = request.expression {
            user_message.push_str(&format!("\n表记：{}", expression));
        }
        if let Some(context) = request.general_context {
            user_message.push_str(&format!("\n词条背景：{}", context));
        }
        if let Some(context) = request.session_context {
            user_message.push_str(&format!("\n本次生成要求：{}", context));
        }

        (user_message, system_message)
    }

    /// 构建配图生成的提示词
    fn build_image_prompt(request: &GenerationRequest<'_>) -> String {
        let mut prompt = format!("为日语词汇「{}」生成一张帮助记忆的插图", request.reading);
        if let Some(expression) = request.expression {
            prompt.push_str(&format!("（表记：{}）", expression));
        }
        prompt.push('。');
        if let Some(context) = request.general_context {
            prompt.push_str(&format!("词条背景：{}。", context));
        }
        if let Some(context) = request.session_context {
            prompt.push_str(&format!("画面要求：{}。", context));
        }
        prompt
    }

    /// 解析讲解生成的响应
    ///
    /// 模型偶尔会把 JSON 包在围栏或说明文字里，这里取第一个 '{' 到
    /// 最后一个 '}' 之间的内容再解析
    fn parse_explanation_payload(model: &str, response: &str) -> AppResult<ExplanationSet> {
        let start = response.find('{');
        let end = response.rfind('}');
        let json = match (start, end) {
            (Some(start), Some(end)) if start <= end => &response[start..=end],
            _ => {
                return Err(AppError::Generation(GenerationError::MalformedPayload {
                    model: model.to_string(),
                    detail: truncate_text(response, 200),
                }))
            }
        };

        #[derive(Deserialize)]
        struct ExplanationPayload {
            easy: String,
            moderate: String,
            advanced: String,
        }

        let payload: ExplanationPayload = serde_json::from_str(json).map_err(|e| {
            AppError::Generation(GenerationError::MalformedPayload {
                model: model.to_string(),
                detail: format!("{} (响应: {})", e, truncate_text(response, 200)),
            })
        })?;

        Ok(ExplanationSet {
            easy: payload.easy,
            moderate: payload.moderate,
            advanced: payload.advanced,
        })
    }
}

/// /images/generations 的响应体
#[derive(Debug, Deserialize)]
struct ImageGenerationResponse {
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    revised_prompt: Option<String>,
}

impl GenerationProvider for LlmGenerationService {
    async fn produce_explanations(
        &self,
        request: &GenerationRequest<'_>,
        cancel: &CancellationToken,
    ) -> AppResult<ExplanationSet> {
        debug!("调用讲解生成，模型: {}", self.model_name);

        let (user_message, system_message) = Self::build_explanation_messages(request);

        let call = async {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(system_message.as_str())
                .build()
                .map_err(|e| AppError::generation_failed(&self.model_name, e))?;
            let user_msg = ChatCompletionRequestUserMessageArgs::default()
                .content(user_message.as_str())
                .build()
                .map_err(|e| AppError::generation_failed(&self.model_name, e))?;

            let chat_request = CreateChatCompletionRequestArgs::default()
                .model(&self.model_name)
                .messages(vec![
                    ChatCompletionRequestMessage::System(system_msg),
                    ChatCompletionRequestMessage::User(user_msg),
                ])
                .temperature(0.7)
                .max_tokens(2048u32)
                .build()
                .map_err(|e| AppError::generation_failed(&self.model_name, e))?;

            let response = self.client.chat().create(chat_request).await.map_err(|e| {
                warn!("讲解生成 API 调用失败: {}", e);
                AppError::generation_failed(&self.model_name, e)
            })?;

            let content = response
                .choices
                .first()
                .and_then(|choice| choice.message.content.clone())
                .ok_or_else(|| {
                    AppError::Generation(GenerationError::EmptyResponse {
                        model: self.model_name.clone(),
                    })
                })?;

            debug!("讲解生成 API 调用成功，响应 {} 字符", content.len());
            Self::parse_explanation_payload(&self.model_name, content.trim())
        };

        self.with_deadline(cancel, call).await
    }

    async fn produce_image(
        &self,
        request: &GenerationRequest<'_>,
        cancel: &CancellationToken,
    ) -> AppResult<GeneratedImage> {
        debug!("调用配图生成，模型: {}", self.image_model_name);

        let prompt = Self::build_image_prompt(request);
        let endpoint = format!(
            "{}/images/generations",
            self.api_base_url.trim_end_matches('/')
        );
        let body = serde_json::json!({
            "model": self.image_model_name,
            "prompt": prompt.as_str(),
            "n": 1,
            "size": "1024x1024",
            "response_format": "b64_json",
        });

        let call = async {
            let response = self
                .http
                .post(&endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| AppError::generation_failed(&self.image_model_name, e))?;

            let status = response.status();
            if !status.is_success() {
                let detail = response.text().await.unwrap_or_else(|_| status.to_string());
                warn!("配图生成 API 返回错误: {} {}", status, truncate_text(&detail, 120));
                return Err(AppError::Generation(GenerationError::BadResponse {
                    model: self.image_model_name.clone(),
                    detail: truncate_text(&detail, 300),
                }));
            }

            let payload: ImageGenerationResponse = response
                .json()
                .await
                .map_err(|e| AppError::generation_failed(&self.image_model_name, e))?;

            let datum = payload.data.into_iter().next().ok_or_else(|| {
                AppError::Generation(GenerationError::EmptyResponse {
                    model: self.image_model_name.clone(),
                })
            })?;

            let bytes = if let Some(b64) = datum.b64_json {
                BASE64.decode(b64.trim()).map_err(|e| {
                    AppError::Generation(GenerationError::MalformedPayload {
                        model: self.image_model_name.clone(),
                        detail: format!("b64_json 解码失败: {}", e),
                    })
                })?
            } else if let Some(image_url) = datum.url {
                // 部分服务忽略 response_format，只给出下载链接
                self.http
                    .get(&image_url)
                    .send()
                    .await
                    .map_err(|e| AppError::generation_failed(&self.image_model_name, e))?
                    .bytes()
                    .await
                    .map_err(|e| AppError::generation_failed(&self.image_model_name, e))?
                    .to_vec()
            } else {
                return Err(AppError::Generation(GenerationError::EmptyResponse {
                    model: self.image_model_name.clone(),
                }));
            };

            debug!("配图生成成功，{} 字节", bytes.len());

            Ok(GeneratedImage {
                bytes,
                extension: "png".to_string(),
                prompt: datum.revised_prompt.or(Some(prompt.clone())),
            })
        };

        self.with_deadline(cancel, call).await
    }
}
