use std::collections::HashMap;

use actix_web::{web, HttpRequest, HttpResponse, Result};

use crate::{
    auth::Session,
    listing::{self, ListQuery, Listable, SortKey},
    models::{non_blank, NewStaff, Service, Staff},
    routes::redirect_with_notice,
    state::AppState,
    templates::{render, Chrome},
};

use super::{
    fetch_error, write_error, AdminConfirmTemplate, AdminFormTemplate, AdminListTemplate, Cell,
    FormField, Header, RowAction, SelectOption, TableRow,
};

const BASE: &str = "/admin/staff";
const SORTABLE: [&str; 4] = ["name", "email", "phone", "active"];
const SERVICE_FIELD: &str = "service";

impl Listable for Staff {
    fn search_fields(&self) -> Vec<&str> {
        [Some(self.name.as_str()), self.phone.as_deref(), self.email.as_deref()]
            .into_iter()
            .flatten()
            .collect()
    }

    fn sort_key(&self, column: &str) -> SortKey {
        match column {
            "email" => SortKey::optional_text(self.email.as_deref()),
            "phone" => SortKey::optional_text(self.phone.as_deref()),
            "active" => SortKey::Number(if self.active { 0.0 } else { 1.0 }),
            _ => SortKey::text(&self.name),
        }
    }
}

/// Staff form values plus the ticked service ids.
struct StaffForm {
    name: String,
    email: String,
    phone: String,
    bio: String,
    active: bool,
    service_ids: Vec<String>,
}

impl Default for StaffForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            email: String::new(),
            phone: String::new(),
            bio: String::new(),
            active: true,
            service_ids: Vec::new(),
        }
    }
}

impl StaffForm {
    fn from_fields(fields: &HashMap<String, String>) -> Self {
        let text = |key: &str| fields.get(key).cloned().unwrap_or_default();
        let prefix = format!("{SERVICE_FIELD}_");
        let mut service_ids: Vec<String> = fields
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            .map(str::to_string)
            .collect();
        service_ids.sort();
        Self {
            name: text("name"),
            email: text("email"),
            phone: text("phone"),
            bio: text("bio"),
            active: fields.get("active").is_some_and(|value| !value.is_empty()),
            service_ids,
        }
    }

    fn from_staff(staff: &Staff, service_ids: Vec<String>) -> Self {
        Self {
            name: staff.name.clone(),
            email: staff.email.clone().unwrap_or_default(),
            phone: staff.phone.clone().unwrap_or_default(),
            bio: staff.bio.clone().unwrap_or_default(),
            active: staff.active,
            service_ids,
        }
    }

    fn validate(&self) -> Result<NewStaff, Vec<String>> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push("Name is required.".to_string());
        }
        let email = non_blank(Some(self.email.clone()));
        if email.as_deref().is_some_and(|email| !email.contains('@')) {
            errors.push("Email address looks invalid.".to_string());
        }
        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(NewStaff {
            name: self.name.trim().to_string(),
            email,
            phone: non_blank(Some(self.phone.clone())),
            bio: non_blank(Some(self.bio.clone())),
            active: self.active,
        })
    }

    fn fields(&self, services: &[Service]) -> Vec<FormField> {
        let options = services
            .iter()
            .map(|service| {
                SelectOption::new(
                    service.id.clone(),
                    service.name.clone(),
                    self.service_ids.contains(&service.id),
                )
            })
            .collect();
        vec![
            FormField::text("name", "Name", self.name.clone()).required(),
            FormField::email("email", "Email", self.email.clone()),
            FormField::tel("phone", "Phone", self.phone.clone()),
            FormField::textarea("bio", "Bio", self.bio.clone()),
            FormField::checkbox("active", "Currently working", self.active),
            FormField::checkboxes(SERVICE_FIELD, "Services", options),
        ]
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/staff")
            .route(web::get().to(list))
            .route(web::post().to(create)),
    )
    .service(web::resource("/staff/new").route(web::get().to(new_form)))
    .service(web::resource("/staff/{id}/edit").route(web::get().to(edit_form)))
    .service(web::resource("/staff/{id}").route(web::post().to(update)))
    .service(
        web::resource("/staff/{id}/delete")
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
    let chrome = Chrome::admin(&state, &req, &session, "staff").with_notice(query.notice.as_deref());
    let fetched = tokio::try_join!(state.gateway.list_staff(), state.gateway.staff_assignments());
    let (members, mut assignments, error) = match fetched {
        Ok((members, assignments)) => (members, assignments, String::new()),
        Err(err) => (Vec::new(), HashMap::new(), fetch_error("staff", &err)),
    };

    let view = listing::build(members, &query, BASE, &SORTABLE, "name");
    let headers = vec![
        Header::sortable("Name", "name", &view.controls),
        Header::sortable("Email", "email", &view.controls),
        Header::sortable("Phone", "phone", &view.controls),
        Header::plain("Services"),
        Header::sortable("Status", "active", &view.controls),
    ];
    let rows = view
        .rows
        .into_iter()
        .map(|member| TableRow {
            actions: RowAction::edit_delete(BASE, &member.id),
            cells: vec![
                Cell::text(member.name),
                Cell::text(member.email.unwrap_or_default()),
                Cell::text(member.phone.unwrap_or_default()),
                Cell::text(assignments.remove(&member.id).unwrap_or_default().join(", ")),
                if member.active {
                    Cell::badge("Active", "ok")
                } else {
                    Cell::badge("Inactive", "muted")
                },
            ],
            detail: String::new(),
        })
        .collect();

    Ok(render(AdminListTemplate {
        chrome,
        title: "Staff",
        new_href: format!("{BASE}/new"),
        controls: view.controls,
        status_value: String::new(),
        filters: Vec::new(),
        headers,
        rows,
        error,
    }))
}

async fn form_page(
    state: &AppState,
    chrome: Chrome,
    title: &str,
    action: String,
    form: &StaffForm,
    mut errors: Vec<String>,
) -> HttpResponse {
    let services = match state.gateway.list_services().await {
        Ok(services) => services,
        Err(err) => {
            errors.push(fetch_error("services", &err));
            Vec::new()
        }
    };
    let mut page = AdminFormTemplate::new(chrome, title, action, BASE);
    page.fields = form.fields(&services);
    page.errors = errors;
    render(page)
}

async fn new_form(
    state: web::Data<AppState>,
    req: HttpRequest,
    session: web::ReqData<Session>,
) -> Result<HttpResponse> {
    let chrome = Chrome::admin(&state, &req, &session, "staff");
    Ok(form_page(&state, chrome, "New staff member", BASE.to_string(), &StaffForm::default(), Vec::new()).await)
}

async fn create(
    state: web::Data<AppState>,
    req: HttpRequest,
    session: web::ReqData<Session>,
    fields: web::Form<HashMap<String, String>>,
) -> Result<HttpResponse> {
    let form = StaffForm::from_fields(&fields);
    let errors = match form.validate() {
        Ok(input) => match state.gateway.create_staff(input).await {
            Ok(member) => {
                if let Err(err) = state.gateway.set_staff_services(&member.id, &form.service_ids).await {
                    log::error!("Saving services for {} failed: {err}", member.id);
                    return Ok(redirect_with_notice(BASE, "failed"));
                }
                log::info!("Staff member {} created", member.name);
                return Ok(redirect_with_notice(BASE, "created"));
            }
            Err(err) => write_error("staff member", &err).into_iter().collect(),
        },
        Err(errors) => errors,
    };
    let chrome = Chrome::admin(&state, &req, &session, "staff");
    Ok(form_page(&state, chrome, "New staff member", BASE.to_string(), &form, errors).await)
}

async fn edit_form(
    state: web::Data<AppState>,
    req: HttpRequest,
    session: web::ReqData<Session>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    let loaded = tokio::try_join!(state.gateway.get_staff(&id), state.gateway.staff_service_ids(&id));
    let (member, service_ids) = match loaded {
        Ok(loaded) => loaded,
        Err(err) => {
            log::warn!("Staff member {id} unavailable: {err}");
            return Ok(redirect_with_notice(BASE, "not_found"));
        }
    };
    let chrome = Chrome::admin(&state, &req, &session, "staff");
    let form = StaffForm::from_staff(&member, service_ids);
    Ok(form_page(&state, chrome, "Edit staff member", format!("{BASE}/{id}"), &form, Vec::new()).await)
}

async fn update(
    state: web::Data<AppState>,
    req: HttpRequest,
    session: web::ReqData<Session>,
    path: web::Path<String>,
    fields: web::Form<HashMap<String, String>>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    let form = StaffForm::from_fields(&fields);
    let errors = match form.validate() {
        Ok(input) => {
            let saved = match state.gateway.update_staff(&id, input).await {
                Ok(_) => state.gateway.set_staff_services(&id, &form.service_ids).await,
                Err(err) => Err(err),
            };
            match saved {
                Ok(()) => return Ok(redirect_with_notice(BASE, "saved")),
                Err(err) => match write_error("staff member", &err) {
                    Some(message) => vec![message],
                    None => return Ok(redirect_with_notice(BASE, "not_found")),
                },
            }
        }
        Err(errors) => errors,
    };
    let chrome = Chrome::admin(&state, &req, &session, "staff");
    Ok(form_page(&state, chrome, "Edit staff member", format!("{BASE}/{id}"), &form, errors).await)
}

async fn confirm_delete(
    state: web::Data<AppState>,
    req: HttpRequest,
    session: web::ReqData<Session>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    let Ok(member) = state.gateway.get_staff(&id).await else {
        return Ok(redirect_with_notice(BASE, "not_found"));
    };
    Ok(render(AdminConfirmTemplate {
        chrome: Chrome::admin(&state, &req, &session, "staff"),
        title: "Delete staff member".to_string(),
        message: format!("Remove {} from the team? Their bookings stay on the calendar unassigned.", member.name),
        action: format!("{BASE}/{id}/delete"),
        cancel_href: BASE,
    }))
}

async fn delete(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    let id = path.into_inner();
    let notice = match state.gateway.delete_staff(&id).await {
        Ok(()) => "deleted",
        Err(err) => {
            log::error!("Failed to delete staff member {id}: {err}");
            "failed"
        }
    };
    Ok(redirect_with_notice(BASE, notice))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticked_services_are_read_from_prefixed_fields() {
        let fields: HashMap<String, String> = [
            ("name", "Marco"),
            ("active", "on"),
            ("service_b", "on"),
            ("service_a", "on"),
            ("phone", ""),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let form = StaffForm::from_fields(&fields);
        assert_eq!(form.service_ids, vec!["a".to_string(), "b".to_string()]);
        assert!(form.active);
        let input = form.validate().unwrap();
        assert_eq!(input.phone, None);
    }

    #[test]
    fn search_covers_name_phone_and_email() {
        let member = Staff {
            id: "s1".to_string(),
            name: "Lena Ortiz".to_string(),
            email: Some("lena@shop.test".to_string()),
            phone: Some("555-0100".to_string()),
            bio: Some("Colour specialist".to_string()),
            active: true,
            created_at: "2024-05-01T00:00:00Z".to_string(),
        };
        assert_eq!(listing::search(vec![member.clone()], "0100").len(), 1);
        assert_eq!(listing::search(vec![member.clone()], "SHOP.TEST").len(), 1);
        assert!(listing::search(vec![member], "colour").is_empty());
    }
}
