use actix_web::http::header::ContentType;
use actix_web::web::{self, Data};
use actix_web::{App, HttpResponse, HttpServer, Responder};
use kube::runtime::reflector::{ObjectRef, Store};
use std::sync::Arc;
use tracing::info;

use super::config::{ServerConfig, DEFAULT_WORKERS};
use crate::api::card::AgentCard;

/// Serves the read-only card API over the watch-fed card cache.
///
/// The facade is not coupled to the reconciler, it only shares the informer
/// store. Beside the registry routes it serves the in-cluster A2A path that
/// derived cards of declarative agents advertise.
pub async fn run_card_server(
    config: ServerConfig,
    cards: Store<AgentCard>,
) -> std::io::Result<()> {
    if !config.enabled {
        info!("card server disabled");
        return Ok(());
    }

    info!(
        "starting card server at http://{}:{}",
        config.host, config.port
    );
    let cards = Data::new(cards);

    HttpServer::new(move || {
        App::new()
            .app_data(cards.clone())
            .service(web::resource("/api/v1alpha1/registry/cards").to(list_cards))
            .service(web::resource("/api/v1alpha1/registry/cards/{namespace}/{name}").to(get_card))
            .service(
                web::resource("/api/v1alpha1/registry/cards/{namespace}/{name}/a2a")
                    .to(get_public_document),
            )
            .service(web::resource("/api/a2a/{namespace}/{name}").to(get_public_document))
    })
    .workers(DEFAULT_WORKERS)
    .bind((config.host.to_string(), config.port.into()))?
    .run()
    .await
}

async fn list_cards(cards: Data<Store<AgentCard>>) -> impl Responder {
    let state = cards.state();
    let items: Vec<&AgentCard> = state.iter().map(|card| card.as_ref()).collect();
    HttpResponse::Ok().json(serde_json::json!({ "items": items }))
}

async fn get_card(
    cards: Data<Store<AgentCard>>,
    path: web::Path<(String, String)>,
) -> impl Responder {
    let (namespace, name) = path.into_inner();
    match lookup(&cards, &namespace, &name) {
        Some(card) => HttpResponse::Ok().json(card.as_ref()),
        None => HttpResponse::NotFound().body("agent card not found"),
    }
}

async fn get_public_document(
    cards: Data<Store<AgentCard>>,
    path: web::Path<(String, String)>,
) -> impl Responder {
    match lookup(&cards, &path.0, &path.1) {
        Some(card) if !card.spec.public_document.is_empty() => HttpResponse::Ok()
            .content_type(ContentType::json())
            .body(card.spec.public_document.clone()),
        Some(_) => HttpResponse::NotFound().body("agent document not available"),
        None => HttpResponse::NotFound().body("agent card not found"),
    }
}

fn lookup(cards: &Store<AgentCard>, namespace: &str, name: &str) -> Option<Arc<AgentCard>> {
    cards.get(&ObjectRef::new(name).within(namespace))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::card::AgentCardSpec;
    use crate::k8s::reflectors::testing::store_with;
    use actix_web::body::MessageBody;
    use actix_web::http::StatusCode;
    use actix_web::test::TestRequest;

    fn card(name: &str, namespace: &str, public_document: &str) -> AgentCard {
        let mut card = AgentCard::new(
            name,
            AgentCardSpec {
                name: name.to_string(),
                public_document: public_document.to_string(),
                ..Default::default()
            },
        );
        card.metadata.namespace = Some(namespace.to_string());
        card
    }

    fn body_of(responder: impl Responder) -> (StatusCode, String) {
        let request = TestRequest::default().to_http_request();
        let response = responder.respond_to(&request);
        let status = response.status();
        let bytes = response
            .map_into_boxed_body()
            .into_body()
            .try_into_bytes()
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_list_cards() {
        let store = store_with(vec![card("a1", "n", ""), card("a2", "n", "")]);

        let (status, body) = body_of(list_cards(Data::new(store)).await);

        assert_eq!(status, StatusCode::OK);
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["items"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_get_card() {
        let store = store_with(vec![card("a1", "n", "")]);

        let path = web::Path::from(("n".to_string(), "a1".to_string()));
        let (status, body) = body_of(get_card(Data::new(store.clone()), path).await);
        assert_eq!(status, StatusCode::OK);
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["spec"]["name"], "a1");

        let path = web::Path::from(("n".to_string(), "missing".to_string()));
        let (status, _) = body_of(get_card(Data::new(store), path).await);
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_get_public_document_serves_embedded_bytes() {
        let document = r#"{"name":"a1","version":"1.0.0"}"#;
        let store = store_with(vec![card("a1", "n", document), card("a2", "n", "")]);

        let path = web::Path::from(("n".to_string(), "a1".to_string()));
        let (status, body) = body_of(get_public_document(Data::new(store.clone()), path).await);
        assert_eq!(status, StatusCode::OK);
        // Served verbatim, not re-encoded.
        assert_eq!(body, document);

        // A card without a document reports not found.
        let path = web::Path::from(("n".to_string(), "a2".to_string()));
        let (status, _) = body_of(get_public_document(Data::new(store), path).await);
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
