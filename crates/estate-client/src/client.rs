use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use uuid::Uuid;

use estate_query::PropertyFilter;
use estate_types::api::{
    AdminUpdateUserRequest, ApiFailure, AuthResponse, CreatePropertyRequest, DashboardResponse,
    ListResult, LoginRequest, RegisterRequest, ReplyRequest, SendMessageRequest,
    ToggleFavoriteResponse, UpdateMessageStatusRequest, UpdatePropertyRequest, UploadResponse,
};
use estate_types::events::Topic;
use estate_types::models::{MessageStatus, Property, PropertyMessage, User};

use crate::cache::{QueryCache, QueryKey};
use crate::error::ClientError;
use crate::favorites::{FAVORITES, FavoritesBackend};
use crate::realtime::RealtimeStream;

/// Cache resources. Mutations invalidate the ones they touch.
pub mod resources {
    pub const PROPERTIES: &str = "properties";
    pub const MY_PROPERTIES: &str = "my_properties";
    pub const PROPERTY: &str = "property";
    pub const INBOX: &str = "inbox";
    pub const USERS: &str = "users";
    pub const DASHBOARD: &str = "dashboard";

    /// One resource per listing so sending a message only drops that
    /// listing's threads.
    pub fn thread(property_id: uuid::Uuid) -> String {
        format!("thread:{}", property_id)
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API root, e.g. `http://localhost:3000`.
    pub base_url: String,
    /// How long a cached read is served without refetching.
    pub stale_time: Duration,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            stale_time: Duration::from_secs(30),
            timeout: Duration::from_secs(30),
        }
    }

    /// WebSocket URL of the realtime gateway.
    pub fn realtime_url(&self) -> String {
        let ws = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.base_url.clone()
        };
        format!("{}/realtime", ws)
    }
}

/// Typed HTTP client for one user session.
#[derive(Clone)]
pub struct EstateClient {
    http: Client,
    config: ClientConfig,
    token: Arc<RwLock<Option<String>>>,
    cache: QueryCache,
}

impl EstateClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            cache: QueryCache::new(config.stale_time),
            config,
            token: Arc::new(RwLock::new(None)),
        })
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set_token(&self, token: Option<String>) {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = token;
        // Cached reads were made as someone else
        self.cache.clear();
    }

    // -- Auth --

    pub async fn register(&self, req: &RegisterRequest) -> Result<User, ClientError> {
        let auth: AuthResponse = self
            .send(self.request(Method::POST, "/auth/register").json(req))
            .await?;
        info!("Registered as {}", auth.user.email);
        self.set_token(Some(auth.token));
        Ok(auth.user)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User, ClientError> {
        let req = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let auth: AuthResponse = self
            .send(self.request(Method::POST, "/auth/login").json(&req))
            .await?;
        info!("Signed in as {}", auth.user.email);
        self.set_token(Some(auth.token));
        Ok(auth.user)
    }

    pub fn logout(&self) {
        self.set_token(None);
    }

    pub async fn me(&self) -> Result<User, ClientError> {
        self.send(self.authed(Method::GET, "/auth/me")?).await
    }

    // -- Properties --

    /// Search listings. Results are cached per canonical filter string.
    pub async fn list_properties(
        &self,
        filter: &PropertyFilter,
    ) -> Result<Arc<ListResult<Property>>, ClientError> {
        let query = filter.to_query_string();
        let key = QueryKey::new(resources::PROPERTIES, query.clone());
        let req = self.request(Method::GET, &with_query("/properties", &query));
        let this = self.clone();
        self.cache.fetch(key, move || async move { this.send(req).await }).await
    }

    /// The previous search result, shown while a new page loads.
    pub fn properties_placeholder(&self) -> Option<Arc<ListResult<Property>>> {
        self.cache.placeholder(resources::PROPERTIES)
    }

    pub async fn my_properties(
        &self,
        filter: &PropertyFilter,
    ) -> Result<Arc<ListResult<Property>>, ClientError> {
        let query = filter.to_query_string();
        let key = QueryKey::new(resources::MY_PROPERTIES, query.clone());
        let req = self.authed(Method::GET, &with_query("/me/properties", &query))?;
        let this = self.clone();
        self.cache.fetch(key, move || async move { this.send(req).await }).await
    }

    pub async fn get_property(&self, id: Uuid) -> Result<Arc<Property>, ClientError> {
        let key = QueryKey::new(resources::PROPERTY, id.to_string());
        let req = self.request(Method::GET, &format!("/properties/{}", id));
        let this = self.clone();
        self.cache.fetch(key, move || async move { this.send(req).await }).await
    }

    pub async fn create_property(&self, req: &CreatePropertyRequest) -> Result<Property, ClientError> {
        let created: Property = self
            .send(self.authed(Method::POST, "/properties")?.json(req))
            .await?;
        self.invalidate_listings();
        Ok(created)
    }

    /// Edit a listing. `req.expected_updated` must carry the `updated` value
    /// the edit is based on; a stale value fails with a conflict.
    pub async fn update_property(
        &self,
        id: Uuid,
        req: &UpdatePropertyRequest,
    ) -> Result<Property, ClientError> {
        let result: Result<Property, _> = self
            .send(self.authed(Method::PATCH, &format!("/properties/{}", id))?.json(req))
            .await;
        if let Err(e) = &result {
            if e.is_conflict() {
                warn!("Edit of {} was based on a stale copy", id);
            }
        }
        // Refetch either way; on conflict the cached copy is the stale one
        self.invalidate_listings();
        result
    }

    pub async fn delete_property(&self, id: Uuid) -> Result<(), ClientError> {
        self.send_empty(self.authed(Method::DELETE, &format!("/properties/{}", id))?)
            .await?;
        self.invalidate_listings();
        self.cache.invalidate(FAVORITES);
        Ok(())
    }

    pub async fn upload_image(
        &self,
        property_id: Uuid,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadResponse, ClientError> {
        let req = self
            .authed(Method::POST, &format!("/properties/{}/images", property_id))?
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes);
        let uploaded = self.send(req).await?;
        self.invalidate_listings();
        Ok(uploaded)
    }

    // -- Favorites --

    pub async fn favorites(&self, page: u32) -> Result<Arc<ListResult<Property>>, ClientError> {
        let query = format!("page={}", page);
        let key = QueryKey::new(FAVORITES, query.clone());
        let req = self.authed(Method::GET, &with_query("/favorites", &query))?;
        let this = self.clone();
        self.cache.fetch(key, move || async move { this.send(req).await }).await
    }

    // -- Messages --

    pub async fn send_message(
        &self,
        property_id: Uuid,
        req: &SendMessageRequest,
    ) -> Result<PropertyMessage, ClientError> {
        let sent = self
            .send(
                self.authed(Method::POST, &format!("/properties/{}/messages", property_id))?
                    .json(req),
            )
            .await?;
        self.cache.invalidate(&resources::thread(property_id));
        Ok(sent)
    }

    /// A thread, oldest first. `sender` defaults to the signed-in user.
    pub async fn thread(
        &self,
        property_id: Uuid,
        sender: Option<Uuid>,
    ) -> Result<Arc<Vec<PropertyMessage>>, ClientError> {
        let query = sender.map(|s| format!("sender={}", s)).unwrap_or_default();
        let key = QueryKey::new(resources::thread(property_id), query.clone());
        let path = with_query(&format!("/properties/{}/messages", property_id), &query);
        let req = self.authed(Method::GET, &path)?;
        let this = self.clone();
        self.cache.fetch(key, move || async move { this.send(req).await }).await
    }

    pub async fn inbox(
        &self,
        status: Option<MessageStatus>,
        page: u32,
    ) -> Result<Arc<ListResult<PropertyMessage>>, ClientError> {
        let mut query = format!("page={}", page);
        if let Some(status) = status {
            query = format!("status={}&{}", status, query);
        }
        let key = QueryKey::new(resources::INBOX, query.clone());
        let req = self.authed(Method::GET, &with_query("/messages/inbox", &query))?;
        let this = self.clone();
        self.cache.fetch(key, move || async move { this.send(req).await }).await
    }

    pub async fn update_message_status(
        &self,
        message_id: Uuid,
        status: MessageStatus,
    ) -> Result<PropertyMessage, ClientError> {
        let updated: PropertyMessage = self
            .send(
                self.authed(Method::PATCH, &format!("/messages/{}/status", message_id))?
                    .json(&UpdateMessageStatusRequest { status }),
            )
            .await?;
        self.invalidate_messages(updated.property_id);
        Ok(updated)
    }

    pub async fn reply(&self, message_id: Uuid, reply: &str) -> Result<PropertyMessage, ClientError> {
        let updated: PropertyMessage = self
            .send(
                self.authed(Method::POST, &format!("/messages/{}/reply", message_id))?
                    .json(&ReplyRequest {
                        reply: reply.to_string(),
                    }),
            )
            .await?;
        self.invalidate_messages(updated.property_id);
        Ok(updated)
    }

    /// Open the realtime gateway and subscribe to one thread.
    pub async fn subscribe_thread(
        &self,
        property_id: Uuid,
        sender_id: Uuid,
    ) -> Result<RealtimeStream, ClientError> {
        let token = self.token().ok_or(ClientError::NotSignedIn)?;
        let mut stream = RealtimeStream::connect(&self.config.realtime_url(), &token).await?;
        stream
            .subscribe(vec![Topic::Thread {
                property_id,
                sender_id,
            }])
            .await?;
        Ok(stream)
    }

    // -- Dashboard --

    pub async fn dashboard(&self) -> Result<Arc<DashboardResponse>, ClientError> {
        let key = QueryKey::new(resources::DASHBOARD, "");
        let req = self.authed(Method::GET, "/dashboard")?;
        let this = self.clone();
        self.cache.fetch(key, move || async move { this.send(req).await }).await
    }

    // -- Admin --

    pub async fn admin_users(
        &self,
        search: Option<&str>,
        page: u32,
    ) -> Result<Arc<ListResult<User>>, ClientError> {
        let mut params: Vec<(&str, String)> = vec![("page", page.to_string())];
        if let Some(q) = search.filter(|q| !q.trim().is_empty()) {
            params.insert(0, ("q", q.trim().to_string()));
        }
        let query = serde_urlencoded::to_string(&params)
            .map_err(|e| ClientError::Decode(e.to_string()))?;
        let key = QueryKey::new(resources::USERS, query.clone());
        let req = self.authed(Method::GET, &with_query("/admin/users", &query))?;
        let this = self.clone();
        self.cache.fetch(key, move || async move { this.send(req).await }).await
    }

    pub async fn admin_update_user(
        &self,
        user_id: Uuid,
        req: &AdminUpdateUserRequest,
    ) -> Result<User, ClientError> {
        let user = self
            .send(self.authed(Method::PATCH, &format!("/admin/users/{}", user_id))?.json(req))
            .await?;
        self.cache.invalidate(resources::USERS);
        Ok(user)
    }

    pub async fn admin_delete_user(&self, user_id: Uuid) -> Result<(), ClientError> {
        self.send_empty(self.authed(Method::DELETE, &format!("/admin/users/{}", user_id))?)
            .await?;
        self.cache.invalidate(resources::USERS);
        self.invalidate_listings();
        Ok(())
    }

    // -- Plumbing --

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self
            .http
            .request(method, format!("{}{}", self.config.base_url, path));
        match self.token() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    fn authed(&self, method: Method, path: &str) -> Result<RequestBuilder, ClientError> {
        if self.token().is_none() {
            return Err(ClientError::NotSignedIn);
        }
        Ok(self.request(method, path))
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ClientError> {
        let response = check(req.send().await?).await?;
        Ok(response.json().await?)
    }

    async fn send_empty(&self, req: RequestBuilder) -> Result<(), ClientError> {
        check(req.send().await?).await?;
        Ok(())
    }

    fn invalidate_listings(&self) {
        self.cache.invalidate(resources::PROPERTIES);
        self.cache.invalidate(resources::MY_PROPERTIES);
        self.cache.invalidate(resources::PROPERTY);
        self.cache.invalidate(resources::DASHBOARD);
    }

    fn invalidate_messages(&self, property_id: Uuid) {
        self.cache.invalidate(&resources::thread(property_id));
        self.cache.invalidate(resources::INBOX);
        self.cache.invalidate(resources::DASHBOARD);
    }
}

#[async_trait]
impl FavoritesBackend for EstateClient {
    async fn toggle_favorite(&self, property_id: Uuid) -> Result<bool, ClientError> {
        let req = self.authed(Method::POST, &format!("/properties/{}/favorite", property_id))?;
        let response: ToggleFavoriteResponse = self.send(req).await?;
        self.cache.invalidate(resources::DASHBOARD);
        Ok(response.favorited)
    }

    async fn favorite_ids(&self) -> Result<Vec<Uuid>, ClientError> {
        self.send(self.authed(Method::GET, "/favorites/ids")?).await
    }
}

/// Turn a non-2xx response into `ClientError::Api`, using the server's
/// failure message when the body has one.
async fn check(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiFailure>(&text)
        .map(|f| f.message)
        .unwrap_or_else(|_| status.canonical_reason().unwrap_or("request failed").to_string());
    debug!("API error {}: {}", status, message);
    Err(ClientError::Api { status, message })
}

fn with_query(path: &str, query: &str) -> String {
    if query.is_empty() {
        path.to_string()
    } else {
        format!("{}?{}", path, query)
    }
}
