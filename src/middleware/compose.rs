//! Choosing what the client sees after a fault.
//!
//! | Request | Diagnostic | Operational |
//! |---|---|---|
//! | API | 500, HTML detail table | 500, `Internal server error` |
//! | page | rethrow upstream | 302 to the error page |

use http::StatusCode;

use crate::config::Environment;
use crate::fault::FaultInfo;
use crate::response::{ContentType, Response};

/// Body sent to API callers in the operational posture.
pub const REDACTED_BODY: &str = "Internal server error";

/// Content type of every inline fault body.
pub const INLINE_CONTENT_TYPE: &str = "text/html";

/// How the orchestrator should finish a faulted request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ResponseDirective {
    InlineBody {
        status: StatusCode,
        content_type: &'static str,
        body: String,
    },
    Redirect {
        location: String,
    },
    /// Hand the original fault to whatever sits above this middleware.
    Rethrow,
}

impl ResponseDirective {
    /// The response for this directive. `None` for [`Rethrow`](Self::Rethrow).
    pub fn into_response(self) -> Option<Response> {
        match self {
            Self::InlineBody { status, body, .. } => Some(
                Response::builder().status(status).bytes(ContentType::Html, body),
            ),
            Self::Redirect { location } => Some(Response::redirect(&location)),
            Self::Rethrow => None,
        }
    }
}

/// Picks the directive for a faulted request. Pure; cannot fail.
pub fn compose(
    is_api: bool,
    environment: Environment,
    info: &FaultInfo,
    original_message: &str,
    error_page: &str,
) -> ResponseDirective {
    match (is_api, environment) {
        (true, Environment::Diagnostic) => ResponseDirective::InlineBody {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            content_type: INLINE_CONTENT_TYPE,
            body: detail_html(info, original_message),
        },
        (true, Environment::Operational) => ResponseDirective::InlineBody {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            content_type: INLINE_CONTENT_TYPE,
            body: REDACTED_BODY.to_owned(),
        },
        (false, Environment::Operational) => ResponseDirective::Redirect {
            location: error_page.to_owned(),
        },
        (false, Environment::Diagnostic) => ResponseDirective::Rethrow,
    }
}

const DETAIL_STYLE: &str = "\
<style>
  .exceptiondetail td {
    vertical-align: top !important;
    padding-top: 5px !important;
  }

  .exceptiondetail td:nth-child(1) {
    text-align: right !important;
    font-weight: bold !important;
    white-space: nowrap !important;
    padding-right: 5px !important;
  }
</style>
";

fn detail_html(info: &FaultInfo, message: &str) -> String {
    let mut html = String::from(DETAIL_STYLE);
    html.push_str("<table class=\"exceptiondetail\">\n");
    push_row(&mut html, "Exception:", &html_escape(message));
    push_row(&mut html, "&nbsp;", "&nbsp;");
    push_row(&mut html, "File Name:", &html_escape(&info.source_file));
    push_row(&mut html, "Method:", &html_escape(&info.qualified_method()));
    push_row(&mut html, "Line Number:", &info.line_number.to_string());
    html.push_str("</table>");
    html
}

fn push_row(html: &mut String, label: &str, value: &str) {
    html.push_str("  <tr>\n    <td>");
    html.push_str(label);
    html.push_str("</td>\n    <td>");
    html.push_str(value);
    html.push_str("</td>\n  </tr>\n");
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}
