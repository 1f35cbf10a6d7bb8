/// Shopping assistant endpoints
///
/// - `POST /api/chatbot/chat` - Answer a conversation (rate limited)
/// - `GET  /api/chatbot/health` - Whether the assistant is configured

use crate::{
    app::AppState,
    assistant::{detect_topics, latest_user_message, ChatTurn, Topics, ORDER_CONTEXT, SELLER_CONTEXT},
    error::{ApiError, ApiResult},
};
use axum::{extract::State, Json};
use matrix_shared::models::{
    assistant_log::AssistantLog,
    product::{Product, ProductFilter},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

/// Products quoted in the context of a product question
const CONTEXT_PRODUCTS: i64 = 2;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatTurn>,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Debug, Serialize)]
pub struct AssistantHealth {
    pub status: &'static str,
    pub configured: bool,
}

/// Joins the context paragraphs for the topics a question touches
fn build_context(topics: Topics, products: Option<String>) -> String {
    let mut parts = Vec::new();

    if let Some(products) = products.filter(|_| topics.products) {
        parts.push(format!("Available products: {}", products));
    }
    if topics.orders {
        parts.push(ORDER_CONTEXT.to_string());
    }
    if topics.sellers {
        parts.push(SELLER_CONTEXT.to_string());
    }

    parts.join("\n")
}

async fn product_context(state: &AppState) -> ApiResult<String> {
    let filter = ProductFilter {
        limit: Some(CONTEXT_PRODUCTS),
        ..ProductFilter::default()
    };

    let products: Vec<_> = Product::list(&state.db, &filter)
        .await?
        .into_iter()
        .map(|p| {
            json!({
                "name": p.name,
                "price": p.price,
                "category": p.category,
                "in_stock": p.stock > 0,
            })
        })
        .collect();

    Ok(serde_json::Value::Array(products).to_string())
}

/// Answers the latest user message
///
/// # Errors
///
/// - `400`: no messages, or no message from the user
/// - `503`: the assistant endpoint is not configured
pub async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> ApiResult<Json<ChatResponse>> {
    if req.messages.is_empty() {
        return Err(ApiError::BadRequest("No messages provided".to_string()));
    }

    let user_message = latest_user_message(&req.messages)
        .ok_or_else(|| ApiError::BadRequest("No user message found".to_string()))?
        .to_string();

    let assistant = state
        .assistant
        .clone()
        .ok_or_else(|| ApiError::ServiceUnavailable("Assistant is not configured".to_string()))?;

    let topics = detect_topics(&user_message);
    let products = if topics.products {
        Some(product_context(&state).await?)
    } else {
        None
    };
    let context = build_context(topics, products);

    let response = assistant.reply(&context, &req.messages, &user_message).await;

    if let Some(user_id) = req.user_id {
        if let Err(e) = AssistantLog::record(&state.db, user_id, &user_message, &response).await {
            tracing::warn!(error = %e, user_id = %user_id, "Failed to log assistant exchange");
        }
    }

    Ok(Json(ChatResponse { response }))
}

pub async fn health(State(state): State<AppState>) -> Json<AssistantHealth> {
    let configured = state.assistant.is_some();
    Json(AssistantHealth {
        status: if configured { "healthy" } else { "unconfigured" },
        configured,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_context_by_topic() {
        let products = Some("[{\"name\":\"Ball\"}]".to_string());

        let only_orders = Topics {
            orders: true,
            ..Topics::default()
        };
        assert_eq!(build_context(only_orders, products.clone()), ORDER_CONTEXT);

        let everything = Topics {
            products: true,
            orders: true,
            sellers: true,
        };
        let context = build_context(everything, products);
        assert!(context.starts_with("Available products: [{\"name\":\"Ball\"}]"));
        assert!(context.ends_with(SELLER_CONTEXT));

        assert_eq!(build_context(Topics::default(), None), "");
    }
}
