use std::sync::Arc;

use crate::application::auth::AdminAuth;
use crate::application::bookmarks::BookmarkService;

use super::rate_limit::ApiRateLimiter;

#[derive(Clone)]
pub struct ApiState {
    pub bookmarks: Arc<BookmarkService>,
    pub auth: Arc<AdminAuth>,
    pub rate_limiter: Arc<ApiRateLimiter>,
}
