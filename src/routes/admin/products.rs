use actix_multipart::Multipart;
use actix_web::{web, HttpRequest, HttpResponse, Result};
use serde::Deserialize;
use tokio_stream::StreamExt;

use crate::{
    auth::Session,
    error::AppError,
    gateway::GatewayError,
    listing::{self, ListQuery, Listable, SortKey},
    models::{non_blank, NewProduct, Product},
    routes::{format_money, redirect_with_notice},
    state::AppState,
    storage::{StorageError, MAX_IMAGE_BYTES},
    templates::{render, Chrome},
};

use super::{
    fetch_error, parse_number, write_error, AdminConfirmTemplate, AdminFormTemplate,
    AdminListTemplate, Cell, FormField, Header, RowAction, TableRow,
};

const BASE: &str = "/admin/products";
const SORTABLE: [&str; 5] = ["name", "brand", "category", "price", "quantity"];
const IMAGE_FIELD: &str = "image";

impl Listable for Product {
    fn search_fields(&self) -> Vec<&str> {
        [Some(self.name.as_str()), self.brand.as_deref(), self.category.as_deref()]
            .into_iter()
            .flatten()
            .collect()
    }

    fn sort_key(&self, column: &str) -> SortKey {
        match column {
            "brand" => SortKey::optional_text(self.brand.as_deref()),
            "category" => SortKey::optional_text(self.category.as_deref()),
            "price" => SortKey::Number(self.sale_price),
            "quantity" => SortKey::Number(self.quantity as f64),
            _ => SortKey::text(&self.name),
        }
    }
}

#[derive(Deserialize)]
struct ProductForm {
    name: String,
    description: Option<String>,
    brand: Option<String>,
    category: Option<String>,
    purchase_price: String,
    original_price: String,
    discount_percentage: String,
    quantity: String,
    reorder_level: String,
}

impl Default for ProductForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: None,
            brand: None,
            category: None,
            purchase_price: "0.00".to_string(),
            original_price: "0.00".to_string(),
            discount_percentage: "0".to_string(),
            quantity: "0".to_string(),
            reorder_level: "5".to_string(),
        }
    }
}

impl ProductForm {
    fn from_product(product: &Product) -> Self {
        Self {
            name: product.name.clone(),
            description: product.description.clone(),
            brand: product.brand.clone(),
            category: product.category.clone(),
            purchase_price: format!("{:.2}", product.purchase_price),
            original_price: format!("{:.2}", product.original_price),
            discount_percentage: product.discount_percentage.to_string(),
            quantity: product.quantity.to_string(),
            reorder_level: product.reorder_level.to_string(),
        }
    }

    /// The image is managed separately, so the caller passes the current one through.
    fn validate(&self, image_url: Option<String>) -> Result<NewProduct, Vec<String>> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push("Name is required.".to_string());
        }
        let purchase_price: Option<f64> = parse_number(&self.purchase_price, "Purchase price", &mut errors);
        let original_price: Option<f64> = parse_number(&self.original_price, "Price", &mut errors);
        for (label, price) in [("Purchase price", purchase_price), ("Price", original_price)] {
            if price.is_some_and(|price| !price.is_finite() || price < 0.0) {
                errors.push(format!("{label} cannot be negative."));
            }
        }
        let discount: Option<f64> = parse_number(&self.discount_percentage, "Discount", &mut errors);
        if discount.is_some_and(|discount| !(0.0..=100.0).contains(&discount)) {
            errors.push("Discount must be between 0 and 100.".to_string());
        }
        let quantity: Option<i64> = parse_number(&self.quantity, "Quantity", &mut errors);
        let reorder_level: Option<i64> = parse_number(&self.reorder_level, "Reorder level", &mut errors);
        if quantity.is_some_and(|quantity| quantity < 0) || reorder_level.is_some_and(|level| level < 0) {
            errors.push("Stock numbers cannot be negative.".to_string());
        }

        match (purchase_price, original_price, discount, quantity, reorder_level) {
            (Some(purchase_price), Some(original_price), Some(discount_percentage), Some(quantity), Some(reorder_level))
                if errors.is_empty() =>
            {
                Ok(NewProduct {
                    name: self.name.trim().to_string(),
                    description: non_blank(self.description.clone()),
                    brand: non_blank(self.brand.clone()),
                    category: non_blank(self.category.clone()),
                    purchase_price,
                    original_price,
                    discount_percentage,
                    quantity,
                    reorder_level,
                    image_url,
                })
            }
            _ => Err(errors),
        }
    }

    fn fields(&self) -> Vec<FormField> {
        vec![
            FormField::text("name", "Name", self.name.clone()).required(),
            FormField::text("brand", "Brand", self.brand.clone().unwrap_or_default()),
            FormField::text("category", "Category", self.category.clone().unwrap_or_default()),
            FormField::textarea("description", "Description", self.description.clone().unwrap_or_default()),
            FormField::number("purchase_price", "Purchase price", self.purchase_price.clone(), "0.01"),
            FormField::number("original_price", "Price", self.original_price.clone(), "0.01").required(),
            FormField::number("discount_percentage", "Discount (%)", self.discount_percentage.clone(), "1")
                .help("The sale price is worked out from the price and discount."),
            FormField::number("quantity", "In stock", self.quantity.clone(), "1").required(),
            FormField::number("reorder_level", "Reorder at", self.reorder_level.clone(), "1")
                .help("Flagged as low stock once the quantity drops to this level."),
        ]
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/products")
            .route(web::get().to(list))
            .route(web::post().to(create)),
    )
    .service(web::resource("/products/new").route(web::get().to(new_form)))
    .service(web::resource("/products/{id}/edit").route(web::get().to(edit_form)))
    .service(web::resource("/products/{id}").route(web::post().to(update)))
    .service(web::resource("/products/{id}/image").route(web::post().to(upload_image)))
    .service(web::resource("/products/{id}/image/remove").route(web::post().to(remove_image)))
    .service(
        web::resource("/products/{id}/delete")
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
    let chrome = Chrome::admin(&state, &req, &session, "products").with_notice(query.notice.as_deref());
    let (products, error) = match state.gateway.list_products().await {
        Ok(products) => (products, String::new()),
        Err(err) => (Vec::new(), fetch_error("products", &err)),
    };

    let view = listing::build(products, &query, BASE, &SORTABLE, "name");
    let headers = vec![
        Header::sortable("Name", "name", &view.controls),
        Header::sortable("Brand", "brand", &view.controls),
        Header::sortable("Category", "category", &view.controls),
        Header::sortable("Price", "price", &view.controls),
        Header::sortable("Stock", "quantity", &view.controls),
    ];
    let rows = view
        .rows
        .into_iter()
        .map(|product| {
            let price = if product.on_sale() {
                format!(
                    "{} (was {}, -{}%)",
                    format_money(product.sale_price),
                    format_money(product.original_price),
                    product.discount_percentage
                )
            } else {
                format_money(product.sale_price)
            };
            let stock = if product.needs_reorder() {
                Cell::badge(format!("{} · low", product.quantity), "warn")
            } else {
                Cell::text(product.quantity.to_string())
            };
            TableRow {
                actions: RowAction::edit_delete(BASE, &product.id),
                cells: vec![
                    Cell::text(product.name.clone()).with_image(product.image_url.as_deref()),
                    Cell::text(product.brand.unwrap_or_default()),
                    Cell::text(product.category.unwrap_or_default()),
                    Cell::text(price),
                    stock,
                ],
                detail: String::new(),
            }
        })
        .collect();

    Ok(render(AdminListTemplate {
        chrome,
        title: "Products",
        new_href: format!("{BASE}/new"),
        controls: view.controls,
        status_value: String::new(),
        filters: Vec::new(),
        headers,
        rows,
        error,
    }))
}

/// Edit pages carry the image panel; the new-product page does not, since there is
/// no record to attach an upload to yet.
fn form_page(
    chrome: Chrome,
    title: &str,
    action: String,
    form: &ProductForm,
    errors: Vec<String>,
    image: Option<(&str, Option<&str>)>,
) -> HttpResponse {
    let mut page = AdminFormTemplate::new(chrome, title, action, BASE);
    page.fields = form.fields();
    page.errors = errors;
    if let Some((id, image_url)) = image {
        page.image_panel = true;
        page.image_url = image_url.unwrap_or_default().to_string();
        page.image_action = format!("{BASE}/{id}/image");
    }
    render(page)
}

async fn new_form(
    state: web::Data<AppState>,
    req: HttpRequest,
    session: web::ReqData<Session>,
) -> Result<HttpResponse> {
    let chrome = Chrome::admin(&state, &req, &session, "products");
    Ok(form_page(chrome, "New product", BASE.to_string(), &ProductForm::default(), Vec::new(), None))
}

async fn create(
    state: web::Data<AppState>,
    req: HttpRequest,
    session: web::ReqData<Session>,
    form: web::Form<ProductForm>,
) -> Result<HttpResponse> {
    let form = form.into_inner();
    let errors = match form.validate(None) {
        Ok(input) => match state.gateway.create_product(input).await {
            Ok(product) => {
                log::info!("Product {} created", product.name);
                // Straight to the edit page so an image can be added.
                return Ok(redirect_with_notice(&format!("{BASE}/{}/edit", product.id), "created"));
            }
            Err(err) => write_error("product", &err).into_iter().collect(),
        },
        Err(errors) => errors,
    };
    let chrome = Chrome::admin(&state, &req, &session, "products");
    Ok(form_page(chrome, "New product", BASE.to_string(), &form, errors, None))
}

async fn edit_form(
    state: web::Data<AppState>,
    req: HttpRequest,
    session: web::ReqData<Session>,
    path: web::Path<String>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    let product = match state.gateway.get_product(&id).await {
        Ok(product) => product,
        Err(err) => {
            log::warn!("Product {id} unavailable: {err}");
            return Ok(redirect_with_notice(BASE, "not_found"));
        }
    };
    let chrome = Chrome::admin(&state, &req, &session, "products").with_notice(query.notice.as_deref());
    Ok(form_page(
        chrome,
        "Edit product",
        format!("{BASE}/{id}"),
        &ProductForm::from_product(&product),
        Vec::new(),
        Some((&id, product.image_url.as_deref())),
    ))
}

async fn update(
    state: web::Data<AppState>,
    req: HttpRequest,
    session: web::ReqData<Session>,
    path: web::Path<String>,
    form: web::Form<ProductForm>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    let form = form.into_inner();
    let Ok(current) = state.gateway.get_product(&id).await else {
        return Ok(redirect_with_notice(BASE, "not_found"));
    };
    let errors = match form.validate(current.image_url.clone()) {
        Ok(input) => match state.gateway.update_product(&id, input).await {
            Ok(_) => return Ok(redirect_with_notice(BASE, "saved")),
            Err(err) => match write_error("product", &err) {
                Some(message) => vec![message],
                None => return Ok(redirect_with_notice(BASE, "not_found")),
            },
        },
        Err(errors) => errors,
    };
    let chrome = Chrome::admin(&state, &req, &session, "products");
    Ok(form_page(
        chrome,
        "Edit product",
        format!("{BASE}/{id}"),
        &form,
        errors,
        Some((&id, current.image_url.as_deref())),
    ))
}

/// Pulls the `image` part out of the upload, stopping as soon as it exceeds the size cap.
async fn read_image(payload: &mut Multipart) -> Result<Option<(String, Vec<u8>)>, AppError> {
    while let Some(field) = payload.next().await {
        let mut field = field.map_err(|err| AppError::Multipart(err.to_string()))?;
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let file_name = field
            .content_disposition()
            .and_then(|disposition| disposition.get_filename())
            .unwrap_or_default()
            .to_string();
        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|err| AppError::Multipart(err.to_string()))?;
            if bytes.len() + chunk.len() > MAX_IMAGE_BYTES {
                return Err(StorageError::TooLarge.into());
            }
            bytes.extend_from_slice(&chunk);
        }
        return Ok(Some((file_name, bytes)));
    }
    Ok(None)
}

async fn upload_image(
    state: web::Data<AppState>,
    path: web::Path<String>,
    mut payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let edit_path = format!("{BASE}/{id}/edit");
    let previous = state.gateway.get_product(&id).await?.image_url;

    let upload = match read_image(&mut payload).await {
        Ok(Some((file_name, bytes))) => state.storage.upload_image(&file_name, &bytes).await,
        Ok(None) => Err(StorageError::Empty),
        Err(AppError::Storage(err)) => Err(err),
        Err(err) => return Err(err),
    };
    let url = match upload {
        Ok(url) => url,
        Err(StorageError::Io(err)) => return Err(StorageError::Io(err).into()),
        Err(err) => {
            log::warn!("Rejected image for product {id}: {err}");
            return Ok(redirect_with_notice(&edit_path, "image_rejected"));
        }
    };

    if let Err(err) = state.gateway.set_product_image(&id, Some(&url)).await {
        discard_image(&state, &url).await;
        return Err(err.into());
    }
    if let Some(previous) = previous {
        discard_image(&state, &previous).await;
    }
    Ok(redirect_with_notice(&edit_path, "image"))
}

async fn remove_image(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let product = state.gateway.get_product(&id).await?;
    if let Some(url) = product.image_url {
        state.gateway.set_product_image(&id, None).await?;
        discard_image(&state, &url).await;
    }
    Ok(redirect_with_notice(&format!("{BASE}/{id}/edit"), "image_removed"))
}

/// A stale file on disk is harmless, so failures are only logged.
async fn discard_image(state: &AppState, url: &str) {
    if let Err(err) = state.storage.delete_image(url).await {
        log::warn!("Couldn't remove image {url}: {err}");
    }
}

async fn confirm_delete(
    state: web::Data<AppState>,
    req: HttpRequest,
    session: web::ReqData<Session>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    let Ok(product) = state.gateway.get_product(&id).await else {
        return Ok(redirect_with_notice(BASE, "not_found"));
    };
    Ok(render(AdminConfirmTemplate {
        chrome: Chrome::admin(&state, &req, &session, "products"),
        title: "Delete product".to_string(),
        message: format!("Delete {} and its image? This cannot be undone.", product.name),
        action: format!("{BASE}/{id}/delete"),
        cancel_href: BASE,
    }))
}

async fn delete(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    let id = path.into_inner();
    let image_url = match state.gateway.get_product(&id).await {
        Ok(product) => product.image_url,
        Err(GatewayError::NotFound(_)) => return Ok(redirect_with_notice(BASE, "not_found")),
        Err(err) => {
            log::error!("Failed to load product {id} for deletion: {err}");
            return Ok(redirect_with_notice(BASE, "failed"));
        }
    };
    let notice = match state.gateway.delete_product(&id).await {
        Ok(()) => {
            if let Some(url) = image_url {
                discard_image(&state, &url).await;
            }
            "deleted"
        }
        Err(err) => {
            log::error!("Failed to delete product {id}: {err}");
            "failed"
        }
    };
    Ok(redirect_with_notice(BASE, notice))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{sample_product, setup_state};
    use actix_web::{
        http::{header, StatusCode},
        test as actix_test, App,
    };

    const BOUNDARY: &str = "----barbershop-test";

    fn multipart_body(file_name: &str, bytes: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{file_name}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn form(price: &str, discount: &str) -> ProductForm {
        ProductForm {
            name: "Matte Clay".to_string(),
            original_price: price.to_string(),
            discount_percentage: discount.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn discount_outside_percentage_range_is_rejected() {
        assert!(form("20", "120").validate(None).is_err());
        assert!(form("20", "-5").validate(None).is_err());
        assert!(form("-1", "0").validate(None).is_err());

        let input = form("20", "25").validate(Some("/uploads/a.png".to_string())).unwrap();
        assert_eq!(input.discount_percentage, 25.0);
        assert_eq!(input.image_url.as_deref(), Some("/uploads/a.png"));
    }

    #[tokio::test]
    async fn search_and_price_sort_use_sale_price() {
        let state = setup_state().await;
        let mut pomade = sample_product("Pomade");
        pomade.original_price = 30.0;
        pomade.discount_percentage = 50.0;
        state.gateway.create_product(pomade).await.unwrap();
        state.gateway.create_product(sample_product("Beard Oil")).await.unwrap();

        let query = ListQuery {
            sort: Some("price".to_string()),
            ..Default::default()
        };
        let products = state.gateway.list_products().await.unwrap();
        let view = listing::build(products.clone(), &query, BASE, &SORTABLE, "name");
        let names: Vec<_> = view.rows.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Beard Oil", "Pomade"]);

        assert_eq!(listing::search(products, "house").len(), 2);
    }

    #[actix_web::test]
    async fn uploading_replaces_the_previous_image() {
        let state = setup_state().await;
        let product = state.gateway.create_product(sample_product("Pomade")).await.unwrap();
        let old_url = state.storage.upload_image("old.png", b"old").await.unwrap();
        state.gateway.set_product_image(&product.id, Some(&old_url)).await.unwrap();

        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .service(web::scope("/admin").configure(configure)),
        )
        .await;
        let req = actix_test::TestRequest::post()
            .uri(&format!("/admin/products/{}/image", product.id))
            .insert_header((
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            ))
            .set_payload(multipart_body("new.PNG", b"fresh image bytes"))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);

        let stored = state.gateway.get_product(&product.id).await.unwrap();
        let new_url = stored.image_url.unwrap();
        assert_ne!(new_url, old_url);
        assert!(new_url.ends_with(".png"));
        let new_name = new_url.trim_start_matches("/uploads/");
        assert!(state.storage.root().join(new_name).exists());
        let old_name = old_url.trim_start_matches("/uploads/");
        assert!(!state.storage.root().join(old_name).exists());
    }

    #[actix_web::test]
    async fn unsupported_uploads_are_rejected_with_a_notice() {
        let state = setup_state().await;
        let product = state.gateway.create_product(sample_product("Pomade")).await.unwrap();
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .service(web::scope("/admin").configure(configure)),
        )
        .await;

        let req = actix_test::TestRequest::post()
            .uri(&format!("/admin/products/{}/image", product.id))
            .insert_header((
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            ))
            .set_payload(multipart_body("notes.txt", b"hello"))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        let location = resp.headers().get(header::LOCATION).unwrap().to_str().unwrap();
        assert!(location.ends_with("/edit?notice=image_rejected"));
        assert!(state.gateway.get_product(&product.id).await.unwrap().image_url.is_none());
    }

    #[actix_web::test]
    async fn removing_the_image_clears_the_record_and_file() {
        let state = setup_state().await;
        let product = state.gateway.create_product(sample_product("Pomade")).await.unwrap();
        let url = state.storage.upload_image("shot.jpg", b"jpeg").await.unwrap();
        state.gateway.set_product_image(&product.id, Some(&url)).await.unwrap();

        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .service(web::scope("/admin").configure(configure)),
        )
        .await;
        let req = actix_test::TestRequest::post()
            .uri(&format!("/admin/products/{}/image/remove", product.id))
            .to_request();
        assert_eq!(actix_test::call_service(&app, req).await.status(), StatusCode::SEE_OTHER);

        assert!(state.gateway.get_product(&product.id).await.unwrap().image_url.is_none());
        let name = url.trim_start_matches("/uploads/");
        assert!(!state.storage.root().join(name).exists());
    }
}
