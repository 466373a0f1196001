use actix_web::{web, HttpRequest, HttpResponse, Result};
use serde::Deserialize;

use crate::{
    auth::Session,
    listing::{self, ListQuery, Listable, SortKey},
    models::{non_blank, Customer, NewCustomer},
    routes::redirect_with_notice,
    state::AppState,
    templates::{render, Chrome},
};

use super::{
    fetch_error, write_error, AdminConfirmTemplate, AdminFormTemplate, AdminListTemplate, Cell,
    FormField, Header, RowAction, TableRow,
};

const BASE: &str = "/admin/customers";
const SORTABLE: [&str; 4] = ["name", "email", "phone", "created_at"];

impl Listable for Customer {
    fn search_fields(&self) -> Vec<&str> {
        [Some(self.name.as_str()), self.email.as_deref(), self.phone.as_deref()]
            .into_iter()
            .flatten()
            .collect()
    }

    fn sort_key(&self, column: &str) -> SortKey {
        match column {
            "email" => SortKey::optional_text(self.email.as_deref()),
            "phone" => SortKey::optional_text(self.phone.as_deref()),
            "created_at" => SortKey::text(&self.created_at),
            _ => SortKey::text(&self.name),
        }
    }
}

#[derive(Deserialize, Default)]
struct CustomerForm {
    name: String,
    email: Option<String>,
    phone: Option<String>,
}

impl CustomerForm {
    fn from_customer(customer: &Customer) -> Self {
        Self {
            name: customer.name.clone(),
            email: customer.email.clone(),
            phone: customer.phone.clone(),
        }
    }

    fn validate(&self) -> Result<NewCustomer, Vec<String>> {
        let mut errors = Vec::new();
        let name = self.name.trim();
        if name.is_empty() {
            errors.push("Name is required.".to_string());
        }
        let email = non_blank(self.email.clone());
        if email.as_deref().is_some_and(|email| !email.contains('@')) {
            errors.push("Email address looks invalid.".to_string());
        }
        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(NewCustomer {
            name: name.to_string(),
            email,
            phone: non_blank(self.phone.clone()),
            user_id: None,
        })
    }

    fn fields(&self) -> Vec<FormField> {
        vec![
            FormField::text("name", "Name", self.name.clone()).required(),
            FormField::email("email", "Email", self.email.clone().unwrap_or_default()),
            FormField::tel("phone", "Phone", self.phone.clone().unwrap_or_default()),
        ]
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/customers")
            .route(web::get().to(list))
            .route(web::post().to(create)),
    )
    .service(web::resource("/customers/new").route(web::get().to(new_form)))
    .service(web::resource("/customers/{id}/edit").route(web::get().to(edit_form)))
    .service(web::resource("/customers/{id}").route(web::post().to(update)))
    .service(
        web::resource("/customers/{id}/delete")
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
    let chrome = Chrome::admin(&state, &req, &session, "customers").with_notice(query.notice.as_deref());
    let (customers, error) = match state.gateway.list_customers().await {
        Ok(customers) => (customers, String::new()),
        Err(err) => (Vec::new(), fetch_error("customers", &err)),
    };

    let view = listing::build(customers, &query, BASE, &SORTABLE, "name");
    let headers = vec![
        Header::sortable("Name", "name", &view.controls),
        Header::sortable("Email", "email", &view.controls),
        Header::sortable("Phone", "phone", &view.controls),
        Header::plain("Account"),
        Header::sortable("Since", "created_at", &view.controls),
    ];
    let rows = view
        .rows
        .into_iter()
        .map(|customer| TableRow {
            actions: RowAction::edit_delete(BASE, &customer.id),
            cells: vec![
                Cell::text(customer.name),
                Cell::text(customer.email.unwrap_or_default()),
                Cell::text(customer.phone.unwrap_or_default()),
                if customer.user_id.is_some() {
                    Cell::badge("Registered", "ok")
                } else {
                    Cell::text("Guest")
                },
                Cell::text(customer.created_at.get(..10).unwrap_or_default().to_string()),
            ],
            detail: String::new(),
        })
        .collect();

    Ok(render(AdminListTemplate {
        chrome,
        title: "Customers",
        new_href: format!("{BASE}/new"),
        controls: view.controls,
        status_value: String::new(),
        filters: Vec::new(),
        headers,
        rows,
        error,
    }))
}

fn form_page(chrome: Chrome, title: &str, action: String, form: &CustomerForm, errors: Vec<String>) -> HttpResponse {
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
    let chrome = Chrome::admin(&state, &req, &session, "customers");
    Ok(form_page(chrome, "New customer", BASE.to_string(), &CustomerForm::default(), Vec::new()))
}

async fn create(
    state: web::Data<AppState>,
    req: HttpRequest,
    session: web::ReqData<Session>,
    form: web::Form<CustomerForm>,
) -> Result<HttpResponse> {
    let form = form.into_inner();
    let errors = match form.validate() {
        Ok(input) => match state.gateway.create_customer(input).await {
            Ok(customer) => {
                log::info!("Customer {} created", customer.id);
                return Ok(redirect_with_notice(BASE, "created"));
            }
            Err(err) => write_error("customer", &err).into_iter().collect(),
        },
        Err(errors) => errors,
    };
    let chrome = Chrome::admin(&state, &req, &session, "customers");
    Ok(form_page(chrome, "New customer", BASE.to_string(), &form, errors))
}

async fn edit_form(
    state: web::Data<AppState>,
    req: HttpRequest,
    session: web::ReqData<Session>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    let customer = match state.gateway.get_customer(&id).await {
        Ok(customer) => customer,
        Err(err) => {
            log::warn!("Customer {id} unavailable: {err}");
            return Ok(redirect_with_notice(BASE, "not_found"));
        }
    };
    let chrome = Chrome::admin(&state, &req, &session, "customers");
    Ok(form_page(
        chrome,
        "Edit customer",
        format!("{BASE}/{id}"),
        &CustomerForm::from_customer(&customer),
        Vec::new(),
    ))
}

async fn update(
    state: web::Data<AppState>,
    req: HttpRequest,
    session: web::ReqData<Session>,
    path: web::Path<String>,
    form: web::Form<CustomerForm>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    let form = form.into_inner();
    let errors = match form.validate() {
        Ok(input) => match state.gateway.update_customer(&id, input).await {
            Ok(_) => return Ok(redirect_with_notice(BASE, "saved")),
            Err(err) => match write_error("customer", &err) {
                Some(message) => vec![message],
                None => return Ok(redirect_with_notice(BASE, "not_found")),
            },
        },
        Err(errors) => errors,
    };
    let chrome = Chrome::admin(&state, &req, &session, "customers");
    Ok(form_page(chrome, "Edit customer", format!("{BASE}/{id}"), &form, errors))
}

async fn confirm_delete(
    state: web::Data<AppState>,
    req: HttpRequest,
    session: web::ReqData<Session>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    let Ok(customer) = state.gateway.get_customer(&id).await else {
        return Ok(redirect_with_notice(BASE, "not_found"));
    };
    Ok(render(AdminConfirmTemplate {
        chrome: Chrome::admin(&state, &req, &session, "customers"),
        title: "Delete customer".to_string(),
        message: format!(
            "Delete {}? Their bookings will be removed as well. This cannot be undone.",
            customer.name
        ),
        action: format!("{BASE}/{id}/delete"),
        cancel_href: BASE,
    }))
}

async fn delete(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    let id = path.into_inner();
    let notice = match state.gateway.delete_customer(&id).await {
        Ok(()) => "deleted",
        Err(err) => {
            log::error!("Failed to delete customer {id}: {err}");
            "failed"
        }
    };
    Ok(redirect_with_notice(BASE, notice))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_covers_name_email_and_phone() {
        let customer = Customer {
            id: "c1".to_string(),
            name: "Dana Reyes".to_string(),
            email: Some("dana@example.com".to_string()),
            phone: Some("555-0142".to_string()),
            user_id: None,
            created_at: "2024-05-01T00:00:00Z".to_string(),
        };
        for term in ["reyes", "EXAMPLE", "0142"] {
            assert_eq!(listing::search(vec![customer.clone()], term).len(), 1, "{term}");
        }
        assert!(listing::search(vec![customer], "zzz").is_empty());
    }

    #[test]
    fn form_requires_a_name_and_plausible_email() {
        let form = CustomerForm {
            name: "  ".to_string(),
            email: Some("not-an-email".to_string()),
            phone: None,
        };
        assert_eq!(form.validate().unwrap_err().len(), 2);

        let form = CustomerForm {
            name: "Lee".to_string(),
            email: Some("  ".to_string()),
            phone: Some(" 555 ".to_string()),
        };
        let input = form.validate().unwrap();
        assert_eq!(input.email, None);
        assert_eq!(input.phone.as_deref(), Some("555"));
    }
}
