use actix_web::{web, HttpRequest, HttpResponse, Result};
use serde::Deserialize;

use crate::{
    auth::Session,
    listing::{self, ListQuery, Listable, SortKey},
    models::{non_blank, NewService, Service},
    pricing::round2,
    routes::{format_money, redirect_with_notice},
    state::AppState,
    templates::{render, Chrome},
};

use super::{
    fetch_error, is_checked, parse_number, write_error, AdminConfirmTemplate, AdminFormTemplate,
    AdminListTemplate, Cell, FormField, Header, RowAction, TableRow,
};

const BASE: &str = "/admin/services";
const SORTABLE: [&str; 5] = ["name", "category", "duration", "price", "active"];

impl Listable for Service {
    fn search_fields(&self) -> Vec<&str> {
        [Some(self.name.as_str()), self.category.as_deref()]
            .into_iter()
            .flatten()
            .collect()
    }

    fn sort_key(&self, column: &str) -> SortKey {
        match column {
            "category" => SortKey::optional_text(self.category.as_deref()),
            "duration" => SortKey::Number(self.duration_minutes as f64),
            "price" => SortKey::Number(self.price),
            "active" => SortKey::Number(if self.active { 0.0 } else { 1.0 }),
            _ => SortKey::text(&self.name),
        }
    }
}

#[derive(Deserialize)]
struct ServiceForm {
    name: String,
    description: Option<String>,
    duration_minutes: String,
    price: String,
    category: Option<String>,
    active: Option<String>,
}

impl Default for ServiceForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: None,
            duration_minutes: "30".to_string(),
            price: "0.00".to_string(),
            category: None,
            active: Some("on".to_string()),
        }
    }
}

impl ServiceForm {
    fn from_service(service: &Service) -> Self {
        Self {
            name: service.name.clone(),
            description: service.description.clone(),
            duration_minutes: service.duration_minutes.to_string(),
            price: format!("{:.2}", service.price),
            category: service.category.clone(),
            active: service.active.then(|| "on".to_string()),
        }
    }

    fn validate(&self) -> Result<NewService, Vec<String>> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push("Name is required.".to_string());
        }
        let duration: Option<i64> = parse_number(&self.duration_minutes, "Duration", &mut errors);
        if duration.is_some_and(|minutes| minutes <= 0) {
            errors.push("Duration must be at least one minute.".to_string());
        }
        let price: Option<f64> = parse_number(&self.price, "Price", &mut errors);
        if price.is_some_and(|price| !price.is_finite() || price < 0.0) {
            errors.push("Price cannot be negative.".to_string());
        }
        match (duration, price) {
            (Some(duration_minutes), Some(price)) if errors.is_empty() => Ok(NewService {
                name: self.name.trim().to_string(),
                description: non_blank(self.description.clone()),
                duration_minutes,
                price: round2(price),
                active: is_checked(&self.active),
                category: non_blank(self.category.clone()),
            }),
            _ => Err(errors),
        }
    }

    fn fields(&self) -> Vec<FormField> {
        vec![
            FormField::text("name", "Name", self.name.clone()).required(),
            FormField::text("category", "Category", self.category.clone().unwrap_or_default()),
            FormField::textarea("description", "Description", self.description.clone().unwrap_or_default()),
            FormField::number("duration_minutes", "Duration (minutes)", self.duration_minutes.clone(), "5").required(),
            FormField::number("price", "Price", self.price.clone(), "0.01").required(),
            FormField::checkbox("active", "Offered to customers", is_checked(&self.active)),
        ]
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/services")
            .route(web::get().to(list))
            .route(web::post().to(create)),
    )
    .service(web::resource("/services/new").route(web::get().to(new_form)))
    .service(web::resource("/services/{id}/edit").route(web::get().to(edit_form)))
    .service(web::resource("/services/{id}").route(web::post().to(update)))
    .service(
        web::resource("/services/{id}/delete")
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
    let chrome = Chrome::admin(&state, &req, &session, "services").with_notice(query.notice.as_deref());
    let (services, error) = match state.gateway.list_services().await {
        Ok(services) => (services, String::new()),
        Err(err) => (Vec::new(), fetch_error("services", &err)),
    };

    let view = listing::build(services, &query, BASE, &SORTABLE, "name");
    let headers = vec![
        Header::sortable("Name", "name", &view.controls),
        Header::sortable("Category", "category", &view.controls),
        Header::sortable("Duration", "duration", &view.controls),
        Header::sortable("Price", "price", &view.controls),
        Header::sortable("Status", "active", &view.controls),
    ];
    let rows = view
        .rows
        .into_iter()
        .map(|service| TableRow {
            actions: RowAction::edit_delete(BASE, &service.id),
            cells: vec![
                Cell::text(service.name),
                Cell::text(service.category.unwrap_or_default()),
                Cell::text(format!("{} min", service.duration_minutes)),
                Cell::text(format_money(service.price)),
                if service.active {
                    Cell::badge("Active", "ok")
                } else {
                    Cell::badge("Hidden", "muted")
                },
            ],
            detail: String::new(),
        })
        .collect();

    Ok(render(AdminListTemplate {
        chrome,
        title: "Services",
        new_href: format!("{BASE}/new"),
        controls: view.controls,
        status_value: String::new(),
        filters: Vec::new(),
        headers,
        rows,
        error,
    }))
}

fn form_page(chrome: Chrome, title: &str, action: String, form: &ServiceForm, errors: Vec<String>) -> HttpResponse {
    let mut page = AdminFormTemplate::new(chrome, title, action, BASE);
    page.fields = form.fields();
    page.errors = errors;
    render(page)
}

async fn new_form(
    state: web::Data<AppState>,
    req: HttpRequest,
    session: web::ReqData<Session>,
) -> Result<HttpResponse> {
    let chrome = Chrome::admin(&state, &req, &session, "services");
    Ok(form_page(chrome, "New service", BASE.to_string(), &ServiceForm::default(), Vec::new()))
}

async fn create(
    state: web::Data<AppState>,
    req: HttpRequest,
    session: web::ReqData<Session>,
    form: web::Form<ServiceForm>,
) -> Result<HttpResponse> {
    let form = form.into_inner();
    let errors = match form.validate() {
        Ok(input) => match state.gateway.create_service(input).await {
            Ok(service) => {
                log::info!("Service {} created", service.name);
                return Ok(redirect_with_notice(BASE, "created"));
            }
            Err(err) => write_error("service", &err).into_iter().collect(),
        },
        Err(errors) => errors,
    };
    let chrome = Chrome::admin(&state, &req, &session, "services");
    Ok(form_page(chrome, "New service", BASE.to_string(), &form, errors))
}

async fn edit_form(
    state: web::Data<AppState>,
    req: HttpRequest,
    session: web::ReqData<Session>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    let Ok(service) = state.gateway.get_service(&id).await else {
        return Ok(redirect_with_notice(BASE, "not_found"));
    };
    let chrome = Chrome::admin(&state, &req, &session, "services");
    Ok(form_page(
        chrome,
        "Edit service",
        format!("{BASE}/{id}"),
        &ServiceForm::from_service(&service),
        Vec::new(),
    ))
}

async fn update(
    state: web::Data<AppState>,
    req: HttpRequest,
    session: web::ReqData<Session>,
    path: web::Path<String>,
    form: web::Form<ServiceForm>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    let form = form.into_inner();
    let errors = match form.validate() {
        Ok(input) => match state.gateway.update_service(&id, input).await {
            Ok(_) => return Ok(redirect_with_notice(BASE, "saved")),
            Err(err) => match write_error("service", &err) {
                Some(message) => vec![message],
                None => return Ok(redirect_with_notice(BASE, "not_found")),
            },
        },
        Err(errors) => errors,
    };
    let chrome = Chrome::admin(&state, &req, &session, "services");
    Ok(form_page(chrome, "Edit service", format!("{BASE}/{id}"), &form, errors))
}

async fn confirm_delete(
    state: web::Data<AppState>,
    req: HttpRequest,
    session: web::ReqData<Session>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    let Ok(service) = state.gateway.get_service(&id).await else {
        return Ok(redirect_with_notice(BASE, "not_found"));
    };
    Ok(render(AdminConfirmTemplate {
        chrome: Chrome::admin(&state, &req, &session, "services"),
        title: "Delete service".to_string(),
        message: format!(
            "Delete {}? Existing bookings keep their time but lose the service link.",
            service.name
        ),
        action: format!("{BASE}/{id}/delete"),
        cancel_href: BASE,
    }))
}

async fn delete(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    let id = path.into_inner();
    let notice = match state.gateway.delete_service(&id).await {
        Ok(()) => "deleted",
        Err(err) => {
            log::error!("Failed to delete service {id}: {err}");
            "failed"
        }
    };
    Ok(redirect_with_notice(BASE, notice))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(duration: &str, price: &str) -> ServiceForm {
        ServiceForm {
            name: "Classic Cut".to_string(),
            duration_minutes: duration.to_string(),
            price: price.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn numbers_are_validated_before_saving() {
        assert!(form("0", "20").validate().is_err());
        assert!(form("thirty", "20").validate().is_err());
        assert!(form("30", "-1").validate().is_err());

        let input = form("45", "19.999").validate().unwrap();
        assert_eq!(input.duration_minutes, 45);
        assert_eq!(input.price, 20.0);
        assert!(input.active);
    }

    #[test]
    fn unchecked_active_box_hides_the_service() {
        let mut hidden = form("30", "10");
        hidden.active = None;
        assert!(!hidden.validate().unwrap().active);
    }
}
