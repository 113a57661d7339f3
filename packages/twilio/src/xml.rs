//! Deterministic TwiML-like XML rendering for the media-stream answer
//! endpoint.

/// Query parameters carried into the media bridge via the stream URL.
#[derive(Debug, Clone, Default)]
pub struct StreamOptions {
    pub speak_first: bool,
    pub initial_message: Option<String>,
}

/// Render `<Response><Connect><Stream url="wss://<host>/media-stream?..."/>
/// </Connect></Response>` for the given host and options.
///
/// Deterministic given its inputs.
pub fn render_answer_xml(media_stream_host: &str, options: &StreamOptions) -> String {
    let mut query = format!("speakFirst={}", options.speak_first);
    if let Some(msg) = &options.initial_message {
        query.push_str("&initialMessage=");
        query.push_str(&urlencode(msg));
    }

    let url = format!("wss://{}/media-stream?{}", media_stream_host, query);

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><Response><Connect><Stream url="{}"/></Connect></Response>"#,
        xml_escape(&url)
    )
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_stream_url_with_options() {
        let xml = render_answer_xml(
            "engine.example.com",
            &StreamOptions {
                speak_first: true,
                initial_message: Some("Hi there!".to_string()),
            },
        );
        assert!(xml.contains("wss://engine.example.com/media-stream?speakFirst=true"));
        assert!(xml.contains("initialMessage=Hi%20there%21"));
        assert!(xml.starts_with("<?xml"));
    }

    #[test]
    fn is_deterministic() {
        let opts = StreamOptions {
            speak_first: false,
            initial_message: None,
        };
        let a = render_answer_xml("host", &opts);
        let b = render_answer_xml("host", &opts);
        assert_eq!(a, b);
    }

    #[test]
    fn escapes_xml_special_characters_in_url() {
        let xml = render_answer_xml(
            "host",
            &StreamOptions {
                speak_first: true,
                initial_message: Some("a&b".to_string()),
            },
        );
        // The literal '&' from urlencoding the message is percent-encoded,
        // so the only '&' left in the XML separates query parameters and
        // must itself be escaped as `&amp;`.
        assert!(xml.contains("&amp;initialMessage="));
    }
}
