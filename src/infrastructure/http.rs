//! HTTP adapters for the hosted commerce backend.
//!
//! Both adapters share one [`ApiClient`]: a `reqwest` client with JSON
//! defaults and an optional bearer token, rooted at the API base url.

use crate::domain::order::{Order, OrderId, TransitionCommand};
use crate::domain::payment::{InitiateBody, InitiateRequest, InitiatedPayment, VerifySnapshot};
use crate::domain::ports::{OrderQuery, OrderStore, PaymentGateway};
use crate::error::{GatewayError, OrderFlowError, Result, TransitionError};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, ClientBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base: Url,
}

impl ApiClient {
    pub fn new(base: &str, token: Option<&str>) -> Result<Self> {
        Self::build(base, token, Client::builder())
    }

    fn build(base: &str, token: Option<&str>, builder: ClientBuilder) -> Result<Self> {
        let mut base = Url::parse(base)
            .map_err(|e| OrderFlowError::Validation(format!("Invalid API url '{base}': {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let mut headers = HeaderMap::new();
        headers.insert("Accept", HeaderValue::from_static("application/json"));
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| OrderFlowError::Validation(format!("Invalid API token: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }
        let client = builder
            .user_agent(concat!("menuflow/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .map_err(|e| OrderFlowError::Store(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Joins a path relative to the API base. Leading slashes are ignored.
    pub fn url(&self, path: &str) -> std::result::Result<Url, url::ParseError> {
        self.base.join(path.trim_start_matches('/'))
    }
}

/// Pulls a readable message out of an error body, falling back to the raw text.
pub fn error_message(body: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        for key in ["detail", "message", "error"] {
            if let Some(Value::String(msg)) = map.get(key) {
                return msg.clone();
            }
        }
    }
    let body = body.trim();
    if body.is_empty() {
        "no details".to_string()
    } else {
        body.to_string()
    }
}

async fn failure_text(res: Response) -> String {
    match res.text().await {
        Ok(body) => error_message(&body),
        Err(e) => e.to_string(),
    }
}

pub struct HttpPaymentGateway {
    api: ApiClient,
}

impl HttpPaymentGateway {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    fn url(&self, path: &str) -> std::result::Result<Url, GatewayError> {
        self.api
            .url(path)
            .map_err(|e| GatewayError::InvalidResponse(format!("Failed to join URL: {e}")))
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn initiate(
        &self,
        request: &InitiateRequest,
    ) -> std::result::Result<InitiatedPayment, GatewayError> {
        let url = self.url("payment/initiate")?;
        let body = InitiateBody::from(request);
        debug!(%url, payment_type = ?body.payment_type, amount = %body.amount, "Initiating payment");
        let res = self.api.client.post(url).json(&body).send().await?;
        let status = res.status();
        if !status.is_success() {
            let message = failure_text(res).await;
            warn!(status = status.as_u16(), %message, "Gateway refused to initiate payment");
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        Ok(res.json::<InitiatedPayment>().await?)
    }

    async fn verify(&self, gateway_txn_id: &str) -> std::result::Result<VerifySnapshot, GatewayError> {
        let url = self.url(&format!("payment/verify/{gateway_txn_id}"))?;
        let res = self.api.client.get(url).send().await?;
        let status = res.status();
        if status == StatusCode::NOT_FOUND {
            return Err(GatewayError::UnknownTransaction(gateway_txn_id.to_string()));
        }
        if !status.is_success() {
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message: failure_text(res).await,
            });
        }
        Ok(res.json::<VerifySnapshot>().await?)
    }
}

/// Paginated list envelope returned by the order endpoints.
#[derive(Debug, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    pub results: Vec<T>,
}

/// Some deployments return a bare array instead of a page.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Listing<T> {
    Paged(Page<T>),
    Bare(Vec<T>),
}

impl<T> Listing<T> {
    pub fn into_items(self) -> Vec<T> {
        match self {
            Listing::Paged(page) => page.results,
            Listing::Bare(items) => items,
        }
    }
}

pub struct HttpOrderStore {
    api: ApiClient,
}

impl HttpOrderStore {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.api
            .url(path)
            .map_err(|e| OrderFlowError::Store(format!("Failed to join URL: {e}")))
    }
}

#[async_trait]
impl OrderStore for HttpOrderStore {
    async fn list(&self, query: &OrderQuery) -> Result<Vec<Order>> {
        let url = self.url("orders/")?;
        let res = self
            .api
            .client
            .get(url)
            .query(&[
                ("status", query.status.as_str().to_string()),
                ("page_size", query.page_size.to_string()),
                ("vendor", query.vendor_id.to_string()),
            ])
            .send()
            .await
            .map_err(|e| OrderFlowError::Store(e.to_string()))?;
        let status = res.status();
        if !status.is_success() {
            let message = failure_text(res).await;
            return Err(OrderFlowError::Store(format!(
                "listing '{}' orders failed ({status}): {message}",
                query.status
            )));
        }
        let listing = res
            .json::<Listing<Order>>()
            .await
            .map_err(|e| OrderFlowError::Store(format!("Malformed order listing: {e}")))?;
        Ok(listing.into_items())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        let url = self.url(&format!("orders/{id}/"))?;
        let res = self
            .api
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| OrderFlowError::Store(e.to_string()))?;
        match res.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => res
                .json::<Order>()
                .await
                .map(Some)
                .map_err(|e| OrderFlowError::Store(format!("Malformed order {id}: {e}"))),
            status => Err(OrderFlowError::Store(format!(
                "fetching order {id} failed ({status}): {}",
                failure_text(res).await
            ))),
        }
    }

    async fn transition(
        &self,
        id: OrderId,
        command: &TransitionCommand,
    ) -> std::result::Result<Order, TransitionError> {
        let url = self
            .url(&format!("orders/{id}/edit"))
            .map_err(|e| TransitionError::Network(e.to_string()))?;
        let res = self
            .api
            .client
            .post(url)
            .form(command)
            .send()
            .await
            .map_err(|e| TransitionError::Network(e.to_string()))?;
        match res.status() {
            StatusCode::NOT_FOUND => Err(TransitionError::NotFound(id)),
            status if status.is_success() => res
                .json::<Order>()
                .await
                .map_err(|e| TransitionError::Network(format!("Malformed order {id}: {e}"))),
            status if status.is_client_error() => {
                Err(TransitionError::Rejected(failure_text(res).await))
            }
            status => Err(TransitionError::Network(format!(
                "{status}: {}",
                failure_text(res).await
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::payment_client::{PaymentGatewayClient, PollPolicy};
    use crate::application::shutdown::Shutdown;
    use crate::domain::order::{Amount, OrderStatus};
    use crate::domain::payment::{IntentStatus, PayerDetails, PaymentReference, PaymentType};
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    #[test]
    fn test_url_join_keeps_base_path() {
        let api = ApiClient::new("https://api.example.com/api", None).unwrap();
        assert_eq!(api.base().as_str(), "https://api.example.com/api/");
        assert_eq!(
            api.url("/payment/verify/TX1").unwrap().as_str(),
            "https://api.example.com/api/payment/verify/TX1"
        );
        assert_eq!(
            api.url("orders/12/edit").unwrap().as_str(),
            "https://api.example.com/api/orders/12/edit"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            ApiClient::new("not a url", None),
            Err(OrderFlowError::Validation(_))
        ));
    }

    #[test]
    fn test_error_message_prefers_detail() {
        assert_eq!(error_message(r#"{"detail": "Not allowed"}"#), "Not allowed");
        assert_eq!(error_message(r#"{"error": "bad amount"}"#), "bad amount");
        assert_eq!(error_message("  Gateway down \n"), "Gateway down");
        assert_eq!(error_message(""), "no details");
    }

    #[test]
    fn test_listing_accepts_page_and_bare_array() {
        let order = r#"{
            "id": 12, "vendor_id": 1, "customer_name": "Ravi", "phone": "98",
            "status": "pending", "payment_status": "paid", "items": [],
            "total": "250.00",
            "created_at": "2026-01-05T10:00:00Z", "updated_at": "2026-01-05T10:00:00Z"
        }"#;
        let paged = format!(r#"{{"count": 1, "next": null, "previous": null, "results": [{order}]}}"#);
        let bare = format!("[{order}]");

        let from_page = serde_json::from_str::<Listing<Order>>(&paged)
            .unwrap()
            .into_items();
        let from_bare = serde_json::from_str::<Listing<Order>>(&bare)
            .unwrap()
            .into_items();
        assert_eq!(from_page, from_bare);
        assert_eq!(from_page[0].id, OrderId(12));
        assert_eq!(from_page[0].status, OrderStatus::Pending);
    }

    #[test]
    fn test_verify_snapshot_tolerates_unknown_status() {
        let snapshot: VerifySnapshot = serde_json::from_str(r#"{"status": "refunded"}"#).unwrap();
        assert_eq!(snapshot.status, IntentStatus::Unknown);
        assert!(snapshot.transaction.is_none());
    }

    #[test]
    fn test_edit_form_body() {
        let command = TransitionCommand {
            status: OrderStatus::Rejected,
            reject_reason: Some("Out of stock".to_string()),
        };
        let encoded = encode_form(&command);
        assert_eq!(encoded, "status=rejected&reject_reason=Out+of+stock");
    }

    fn encode_form(command: &TransitionCommand) -> String {
        let request = Client::new()
            .post("http://localhost/orders/1/edit")
            .form(command)
            .build()
            .unwrap();
        String::from_utf8(request.body().unwrap().as_bytes().unwrap().to_vec()).unwrap()
    }

    /// Answers one connection per canned response and records each request.
    struct StubServer {
        base: String,
        requests: Arc<Mutex<Vec<String>>>,
    }

    impl StubServer {
        async fn start<B: Into<String>>(responses: Vec<(u16, B)>) -> Self {
            let responses: Vec<(u16, String)> =
                responses.into_iter().map(|(s, b)| (s, b.into())).collect();
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let requests = Arc::new(Mutex::new(Vec::new()));
            let seen = requests.clone();
            tokio::spawn(async move {
                for (status, body) in responses {
                    let Ok((mut socket, _)) = listener.accept().await else {
                        return;
                    };
                    let request = read_request(&mut socket).await;
                    seen.lock().push(request);
                    let response = format!(
                        "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                }
            });
            Self {
                base: format!("http://{addr}/api"),
                requests,
            }
        }

        fn api(&self) -> ApiClient {
            ApiClient::build(&self.base, Some("secret"), Client::builder().no_proxy()).unwrap()
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().clone()
        }
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                let length = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    break;
                }
            }
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    const ORDER: &str = r#"{
        "id": 12, "vendor_id": 1, "customer_name": "Ravi", "phone": "98",
        "status": "pending", "payment_status": "paid", "items": [],
        "total": "250.00",
        "created_at": "2026-01-05T10:00:00Z", "updated_at": "2026-01-05T10:00:00Z"
    }"#;

    #[tokio::test]
    async fn test_verify_maps_status_codes() {
        let server = StubServer::start(vec![
            (200, r#"{"status": "pending"}"#),
            (404, r#"{"detail": "Not found."}"#),
            (503, r#"{"detail": "maintenance"}"#),
        ])
        .await;
        let gateway = HttpPaymentGateway::new(server.api());

        assert_eq!(
            gateway.verify("TX1").await.unwrap().status,
            IntentStatus::Pending
        );
        assert!(matches!(
            gateway.verify("TX2").await,
            Err(GatewayError::UnknownTransaction(ref id)) if id == "TX2"
        ));
        assert!(matches!(
            gateway.verify("TX3").await,
            Err(GatewayError::Rejected { status: 503, ref message }) if message == "maintenance"
        ));

        let requests = server.requests();
        assert!(requests[0].starts_with("GET /api/payment/verify/TX1 HTTP/1.1"));
        assert!(requests[0].to_lowercase().contains("authorization: bearer secret"));
        assert!(requests[1].starts_with("GET /api/payment/verify/TX2 "));
    }

    #[tokio::test]
    async fn test_unknown_transaction_aborts_polling_over_http() {
        let server = StubServer::start(vec![(404, "")]).await;
        let client = PaymentGatewayClient::new(Box::new(HttpPaymentGateway::new(server.api())));
        let policy = PollPolicy {
            max_attempts: 5,
            interval: Duration::from_millis(10),
        };

        let result = client
            .poll_until_settled("TX9", policy, Shutdown::never())
            .await;

        assert!(matches!(
            result,
            Err(OrderFlowError::Gateway(GatewayError::UnknownTransaction(_)))
        ));
        assert_eq!(server.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_initiate_refusal_carries_server_message() {
        let server = StubServer::start(vec![(400, r#"{"message": "amount too low"}"#)]).await;
        let gateway = HttpPaymentGateway::new(server.api());
        let request = InitiateRequest {
            reference: PaymentReference::existing(PaymentType::Dues, 4).unwrap(),
            amount: Amount::new(dec!(10.00)).unwrap(),
            payer: PayerDetails {
                name: "Vendor".to_string(),
                mobile: "9800000000".to_string(),
                email: None,
            },
        };

        let result = gateway.initiate(&request).await;

        assert!(matches!(
            result,
            Err(GatewayError::Rejected { status: 400, ref message }) if message == "amount too low"
        ));
        assert!(server.requests()[0].starts_with("POST /api/payment/initiate HTTP/1.1"));
    }

    #[tokio::test]
    async fn test_list_sends_query_and_decodes_page() {
        let page =
            format!(r#"{{"count": 1, "next": null, "previous": null, "results": [{ORDER}]}}"#);
        let server = StubServer::start(vec![(200, page), (500, "boom".to_string())]).await;
        let store = HttpOrderStore::new(server.api());
        let query = OrderQuery {
            vendor_id: 1,
            status: OrderStatus::Pending,
            page_size: 50,
        };

        let orders = store.list(&query).await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].id, OrderId(12));
        assert_eq!(orders[0].total, dec!(250.00));
        assert!(server.requests()[0]
            .starts_with("GET /api/orders/?status=pending&page_size=50&vendor=1 HTTP/1.1"));

        assert!(matches!(store.list(&query).await, Err(OrderFlowError::Store(_))));
    }

    #[tokio::test]
    async fn test_transition_maps_status_codes() {
        let server = StubServer::start(vec![
            (200, ORDER),
            (409, r#"{"detail": "Order already accepted"}"#),
            (404, ""),
            (502, "bad gateway"),
        ])
        .await;
        let store = HttpOrderStore::new(server.api());
        let accept = TransitionCommand {
            status: OrderStatus::Accepted,
            reject_reason: None,
        };

        assert_eq!(store.transition(OrderId(12), &accept).await.unwrap().id, OrderId(12));
        assert_eq!(
            store.transition(OrderId(12), &accept).await,
            Err(TransitionError::Rejected("Order already accepted".to_string()))
        );
        assert_eq!(
            store.transition(OrderId(13), &accept).await,
            Err(TransitionError::NotFound(OrderId(13)))
        );
        assert!(matches!(
            store.transition(OrderId(12), &accept).await,
            Err(TransitionError::Network(ref m)) if m.contains("bad gateway")
        ));

        let first = &server.requests()[0];
        assert!(first.starts_with("POST /api/orders/12/edit HTTP/1.1"));
        assert!(first.ends_with("status=accepted"));
    }
}
