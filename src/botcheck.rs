/// Collaborator interface: classifies a request's declared client
/// identity. The session core only ever consumes the boolean.
pub trait BotClassifier: Send + Sync {
    fn is_bot(&self, user_agent: Option<&str>) -> bool;
}

/// Substring heuristic over the User-Agent, in the spirit of the usual
/// crawler lists. A request that declares no User-Agent at all counts as
/// a bot.
pub struct UaBotClassifier;

const BOT_MARKERS: &[&str] = &[
    "bot",
    "crawler",
    "spider",
    "crawling",
    "slurp",
    "curl",
    "wget",
    "python-requests",
    "go-http-client",
    "headlesschrome",
    "facebookexternalhit",
    "lighthouse",
];

impl BotClassifier for UaBotClassifier {
    fn is_bot(&self, user_agent: Option<&str>) -> bool {
        let Some(ua) = user_agent else {
            return true;
        };
        let ua = ua.to_ascii_lowercase();
        BOT_MARKERS.iter().any(|marker| ua.contains(marker))
    }
}
