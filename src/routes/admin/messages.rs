use actix_web::{web, HttpRequest, HttpResponse, Result};
use serde::Deserialize;

use crate::{
    auth::Session,
    gateway::GatewayError,
    guards,
    listing::{self, ListQuery, Listable, SortKey},
    models::{Message, MESSAGE_ARCHIVED, MESSAGE_READ, MESSAGE_STATUSES, MESSAGE_UNREAD},
    routes::redirect_with_notice,
    state::AppState,
    templates::{render, Chrome},
};

use super::{fetch_error, AdminConfirmTemplate, AdminListTemplate, Cell, FilterLink, Header, RowAction, TableRow};

const BASE: &str = "/admin/messages";
const SORTABLE: [&str; 4] = ["received", "name", "subject", "status"];
/// Bodies longer than this are cut in the table and can be expanded per row.
const PREVIEW_CHARS: usize = 80;

impl Listable for Message {
    fn search_fields(&self) -> Vec<&str> {
        [
            Some(self.name.as_str()),
            Some(self.email.as_str()),
            self.subject.as_deref(),
            Some(self.body.as_str()),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    fn sort_key(&self, column: &str) -> SortKey {
        match column {
            "name" => SortKey::text(&self.name),
            "subject" => SortKey::optional_text(self.subject.as_deref()),
            "status" => SortKey::text(&self.status),
            _ => SortKey::text(&self.created_at),
        }
    }
}

fn preview(body: &str) -> (String, bool) {
    if body.chars().count() <= PREVIEW_CHARS {
        return (body.to_string(), false);
    }
    let cut: String = body.chars().take(PREVIEW_CHARS).collect();
    (format!("{}…", cut.trim_end()), true)
}

/// Status buttons post back with `return_to` so the list reopens on the same
/// filter, search and page.
fn status_actions(message: &Message, return_to: &str) -> Vec<RowAction> {
    let href = format!(
        "{BASE}/{}/status?return_to={}",
        message.id,
        urlencoding::encode(return_to)
    );
    let mut actions = Vec::new();
    match message.status.as_str() {
        MESSAGE_UNREAD => actions.push(RowAction::post("Mark read", &href, "status", MESSAGE_READ)),
        _ => actions.push(RowAction::post("Mark unread", &href, "status", MESSAGE_UNREAD)),
    }
    if message.status != MESSAGE_ARCHIVED {
        actions.push(RowAction::post("Archive", &href, "status", MESSAGE_ARCHIVED));
    }
    actions
}

#[derive(Deserialize)]
struct StatusForm {
    status: String,
}

#[derive(Deserialize)]
struct ReturnQuery {
    return_to: Option<String>,
}

/// The message list URL to go back to; anything else falls back to the bare list.
fn return_target(raw: Option<&str>) -> String {
    let target = guards::safe_redirect_target(raw, BASE);
    if target == BASE || target.starts_with(&format!("{BASE}?")) {
        target
    } else {
        BASE.to_string()
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/messages").route(web::get().to(list)))
        .service(web::resource("/messages/{id}/status").route(web::post().to(set_status)))
        .service(
            web::resource("/messages/{id}/delete")
                .route(web::get().to(confirm_delete))
                .route(web::post().to(delete)),
        );
}

async fn list(
    state: web::Data<AppState>,
    req: HttpRequest,
    session: web::ReqData<Session>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse> {
    let chrome = Chrome::admin(&state, &req, &session, "messages").with_notice(query.notice.as_deref());
    let (messages, error) = match state.gateway.list_messages().await {
        Ok(messages) => (messages, String::new()),
        Err(err) => (Vec::new(), fetch_error("messages", &err)),
    };

    let status = query
        .status
        .as_deref()
        .filter(|status| MESSAGE_STATUSES.contains(status))
        .map(str::to_string);
    let messages: Vec<Message> = match status.as_deref() {
        Some(status) => messages.into_iter().filter(|message| message.status == status).collect(),
        None => messages,
    };

    let mut query = query.into_inner();
    if query.sort.is_none() {
        query.sort = Some("received".to_string());
        query.dir = Some("desc".to_string());
    }
    let expanded = query.expand.clone().unwrap_or_default();
    let view = listing::build(messages, &query, BASE, &SORTABLE, "received");

    let mut filters = vec![FilterLink {
        label: "All".to_string(),
        href: view.controls.status_href("all"),
        active: status.is_none(),
    }];
    filters.extend(MESSAGE_STATUSES.iter().map(|value| FilterLink {
        label: crate::hours::title_case(value),
        href: view.controls.status_href(value),
        active: status.as_deref() == Some(*value),
    }));

    let headers = vec![
        Header::sortable("Received", "received", &view.controls),
        Header::sortable("From", "name", &view.controls),
        Header::sortable("Subject", "subject", &view.controls),
        Header::plain("Message"),
        Header::sortable("Status", "status", &view.controls),
    ];
    let collapse_href = view.controls.page_href(view.controls.page.number);
    let return_to = if expanded.is_empty() {
        collapse_href.clone()
    } else {
        view.controls.current_href_with("expand", &expanded)
    };
    let rows = view
        .rows
        .into_iter()
        .map(|message| {
            let (short, truncated) = preview(&message.body);
            let is_expanded = truncated && expanded == message.id;
            let mut actions = status_actions(&message, &return_to);
            if is_expanded {
                actions.insert(0, RowAction::link("Collapse", collapse_href.clone()));
            } else if truncated {
                actions.insert(0, RowAction::link("Expand", view.controls.current_href_with("expand", &message.id)));
            }
            actions.push(RowAction::link("Delete", format!("{BASE}/{}/delete", message.id)));

            let from = match message.phone.as_deref() {
                Some(phone) => format!("{} <{}> · {phone}", message.name, message.email),
                None => format!("{} <{}>", message.name, message.email),
            };
            let badge = if message.status == MESSAGE_UNREAD { "info" } else { "muted" };
            TableRow {
                cells: vec![
                    Cell::text(message.created_at.get(..16).unwrap_or(&message.created_at).replace('T', " ")),
                    Cell::link(from, format!("mailto:{}", message.email)),
                    Cell::text(message.subject.clone().unwrap_or_default()),
                    Cell::text(short),
                    Cell::badge(crate::hours::title_case(&message.status), badge),
                ],
                actions,
                detail: if is_expanded { message.body } else { String::new() },
            }
        })
        .collect();

    Ok(render(AdminListTemplate {
        chrome,
        title: "Messages",
        new_href: String::new(),
        controls: view.controls,
        status_value: status.unwrap_or_default(),
        filters,
        headers,
        rows,
        error,
    }))
}

async fn set_status(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<ReturnQuery>,
    form: web::Form<StatusForm>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    let back = return_target(query.return_to.as_deref());
    if !MESSAGE_STATUSES.contains(&form.status.as_str()) {
        log::warn!("Ignoring unknown message status {:?}", form.status);
        return Ok(redirect_with_notice(&back, "failed"));
    }
    let notice = match state.gateway.update_message_status(&id, &form.status).await {
        Ok(message) => {
            log::info!("Message {} marked {}", message.id, message.status);
            "status"
        }
        Err(GatewayError::NotFound(_)) => "not_found",
        Err(err) => {
            log::error!("Failed to update message {id}: {err}");
            "failed"
        }
    };
    Ok(redirect_with_notice(&back, notice))
}

async fn confirm_delete(
    state: web::Data<AppState>,
    req: HttpRequest,
    session: web::ReqData<Session>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    let Ok(message) = state.gateway.get_message(&id).await else {
        return Ok(redirect_with_notice(BASE, "not_found"));
    };
    Ok(render(AdminConfirmTemplate {
        chrome: Chrome::admin(&state, &req, &session, "messages"),
        title: "Delete message".to_string(),
        message: format!("Delete the message from {}? This cannot be undone.", message.name),
        action: format!("{BASE}/{id}/delete"),
        cancel_href: BASE,
    }))
}

async fn delete(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    let id = path.into_inner();
    let notice = match state.gateway.delete_message(&id).await {
        Ok(()) => "deleted",
        Err(GatewayError::NotFound(_)) => "not_found",
        Err(err) => {
            log::error!("Failed to delete message {id}: {err}");
            "failed"
        }
    };
    Ok(redirect_with_notice(BASE, notice))
}
