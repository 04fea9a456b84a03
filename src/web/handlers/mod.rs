mod demo;
mod newsletter;

pub use demo::demo_request;
pub use newsletter::{
    send_newsletter, subscribe, template_preview, unsubscribe, unsubscribe_link,
};
