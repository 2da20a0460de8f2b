use axum::response::Html;

use lifeline_core::gateway::GatewayResponse;
use lifeline_core::messages::{LinkAction, format_timestamp};

const DEFAULT_TITLE: &str = "Notice";

/// Presentation settings shared by every page.
#[derive(Debug, Clone)]
pub struct PageStyle {
    pub title: String,
    /// Where the prompt form posts back to.
    pub form_action: String,
}

impl PageStyle {
    pub fn new(form_action: impl Into<String>) -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            form_action: form_action.into(),
        }
    }
}

impl Default for PageStyle {
    fn default() -> Self {
        Self::new("/")
    }
}

pub fn render(response: &GatewayResponse, style: &PageStyle) -> Html<String> {
    let body = match response {
        GatewayResponse::Neutral => "<p>OK.</p>".to_string(),
        GatewayResponse::Invalid => "<p>This link is not valid.</p>".to_string(),
        GatewayResponse::Prompt { action, id, sig } => prompt(*action, id, sig, style),
        GatewayResponse::Confirmed {
            next_check_at,
            deadline_at,
        } => format!(
            "<h1>Thank you</h1>\n<p>Your check-in was recorded.</p>\n\
             <p class=\"info\">Next check-in opens {}; deadline {}.</p>",
            format_timestamp(*next_check_at),
            format_timestamp(*deadline_at),
        ),
        GatewayResponse::Acknowledged => {
            "<h1>Thank you</h1>\n<p>Receipt of the message was recorded.</p>".to_string()
        }
        GatewayResponse::AlreadyEscalated => "<h1>Too late</h1>\n\
             <p>The deadline passed and your contacts have already been notified. \
             The switch must be reset by its operator before a new cycle starts.</p>"
            .to_string(),
        GatewayResponse::Failure { code } => format!(
            "<p>Something went wrong. Please try again later.</p>\n\
             <p class=\"info\">Reference: {}</p>",
            html_escape(code)
        ),
    };
    Html(document(&style.title, &body))
}

fn prompt(action: LinkAction, id: &str, sig: &str, style: &PageStyle) -> String {
    let (heading, button) = match action {
        LinkAction::Confirm => ("Confirm check-in", "Yes, I am OK"),
        LinkAction::Ack => ("Confirm receipt", "I received the message"),
    };
    format!(
        r#"<h1>{heading}</h1>
<form method="POST" action="{form_action}">
<input type="hidden" name="a" value="{action}">
<input type="hidden" name="id" value="{id}">
<input type="hidden" name="sig" value="{sig}">
<button type="submit">{button}</button>
</form>"#,
        form_action = html_escape(&style.form_action),
        action = action.as_str(),
        id = html_escape(id),
        sig = html_escape(sig),
    )
}

fn document(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<meta name="robots" content="noindex, nofollow">
<title>{title}</title>
<style>
body {{ font-family: system-ui, sans-serif; max-width: 400px; margin: 60px auto; padding: 0 20px; }}
h1 {{ font-size: 1.4em; }}
button {{ margin-top: 20px; padding: 10px 24px; background: #111; color: #fff; border: none; cursor: pointer; font-size: 1em; }}
.info {{ color: #666; font-size: 0.9em; margin-top: 8px; }}
</style>
</head>
<body>
{body}
</body>
</html>"#,
        title = html_escape(title),
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_posts_hidden_credentials_back() {
        let style = PageStyle::new("/check");
        let Html(page) = render(
            &GatewayResponse::Prompt {
                action: LinkAction::Confirm,
                id: "abc".to_string(),
                sig: "d\"ef".to_string(),
            },
            &style,
        );
        assert!(page.contains(r#"<form method="POST" action="/check">"#));
        assert!(page.contains(r#"name="a" value="confirm""#));
        assert!(page.contains(r#"name="sig" value="d&quot;ef""#));
    }

    #[test]
    fn neutral_page_carries_no_detail() {
        let Html(page) = render(&GatewayResponse::Neutral, &PageStyle::default());
        assert!(page.contains("<p>OK.</p>"));
        assert!(!page.contains("form"));
        assert!(!page.to_lowercase().contains("lifeline"));
    }

    #[test]
    fn failure_page_shows_reference_code() {
        let Html(page) = render(
            &GatewayResponse::Failure {
                code: "0190abcd".to_string(),
            },
            &PageStyle::default(),
        );
        assert!(page.contains("Reference: 0190abcd"));
    }
}
