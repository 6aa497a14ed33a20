mod ping;
mod redirect;
mod shorten;
mod user;

pub use ping::ping_handler;
pub use redirect::redirect_handler;
pub use shorten::{shorten_batch_handler, shorten_json_handler, shorten_text_handler};
pub use user::{delete_user_links_handler, list_user_links_handler};
