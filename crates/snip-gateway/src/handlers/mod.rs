mod health;
mod url;

pub use health::ping_handler;
pub use self::url::{
    redirect_handler, shorten_batch_handler, shorten_json_handler, shorten_text_handler,
    user_urls_handler, validate_url,
};
