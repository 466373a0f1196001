//! Interface language for the public pages, remembered in a cookie.

use actix_web::{
    cookie::{time::Duration as CookieDuration, Cookie, SameSite},
    HttpRequest,
};

pub const LANGUAGE_COOKIE: &str = "i18nextLng";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Language {
    #[default]
    En,
    Es,
}

impl Language {
    /// Accepts region-tagged values such as `es-MX`.
    pub fn parse(value: &str) -> Option<Self> {
        let primary = value.trim().split(['-', '_']).next()?.to_ascii_lowercase();
        match primary.as_str() {
            "en" => Some(Self::En),
            "es" => Some(Self::Es),
            _ => None,
        }
    }

    pub fn from_request(req: &HttpRequest) -> Self {
        req.cookie(LANGUAGE_COOKIE)
            .and_then(|cookie| Self::parse(cookie.value()))
            .unwrap_or_default()
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Es => "es",
        }
    }

    pub fn cookie(self) -> Cookie<'static> {
        Cookie::build(LANGUAGE_COOKIE, self.code())
            .path("/")
            .same_site(SameSite::Lax)
            .max_age(CookieDuration::days(365))
            .finish()
    }

    pub fn labels(self) -> &'static Labels {
        match self {
            Self::En => &EN,
            Self::Es => &ES,
        }
    }
}

pub struct Labels {
    pub home: &'static str,
    pub products: &'static str,
    pub book: &'static str,
    pub contact: &'static str,
    pub login: &'static str,
    pub logout: &'static str,
    pub register: &'static str,
    pub admin: &'static str,
    pub services: &'static str,
    pub hours: &'static str,
    pub closed: &'static str,
    pub featured: &'static str,
    pub hero_title: &'static str,
    pub hero_body: &'static str,
    pub book_cta: &'static str,
    pub search: &'static str,
    pub select_date: &'static str,
    pub select_time: &'static str,
    pub no_slots: &'static str,
    pub your_details: &'static str,
    pub phone: &'static str,
    pub message: &'static str,
    pub back: &'static str,
    pub confirm: &'static str,
    pub confirmed_title: &'static str,
    pub book_another: &'static str,
    pub send: &'static str,
    pub name: &'static str,
    pub email: &'static str,
    pub password: &'static str,
    pub subject: &'static str,
}

static EN: Labels = Labels {
    home: "Home",
    products: "Products",
    book: "Book",
    contact: "Contact",
    login: "Log in",
    logout: "Log out",
    register: "Create account",
    admin: "Admin",
    services: "Services",
    hours: "Opening hours",
    closed: "Closed",
    featured: "Featured products",
    hero_title: "Sharp cuts, no waiting.",
    hero_body: "Pick a time that suits you and we'll have the chair ready.",
    book_cta: "Book an appointment",
    search: "Search",
    select_date: "Choose a date",
    select_time: "Choose a time",
    no_slots: "No times available on this day.",
    your_details: "Your details",
    phone: "Phone",
    message: "What would you like done?",
    back: "Back",
    confirm: "Confirm booking",
    confirmed_title: "You're booked!",
    book_another: "Book another",
    send: "Send",
    name: "Name",
    email: "Email",
    password: "Password",
    subject: "Subject",
};

static ES: Labels = Labels {
    home: "Inicio",
    products: "Productos",
    book: "Reservar",
    contact: "Contacto",
    login: "Iniciar sesión",
    logout: "Cerrar sesión",
    register: "Crear cuenta",
    admin: "Administración",
    services: "Servicios",
    hours: "Horario",
    closed: "Cerrado",
    featured: "Productos destacados",
    hero_title: "Cortes precisos, sin esperas.",
    hero_body: "Elige la hora que te convenga y tendremos la silla lista.",
    book_cta: "Reservar una cita",
    search: "Buscar",
    select_date: "Elige una fecha",
    select_time: "Elige una hora",
    no_slots: "No hay horas disponibles este día.",
    your_details: "Tus datos",
    phone: "Teléfono",
    message: "¿Qué te gustaría hacerte?",
    back: "Atrás",
    confirm: "Confirmar reserva",
    confirmed_title: "¡Reserva confirmada!",
    book_another: "Reservar otra",
    send: "Enviar",
    name: "Nombre",
    email: "Correo",
    password: "Contraseña",
    subject: "Asunto",
};

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn region_tags_map_to_base_language() {
        assert_eq!(Language::parse("es-MX"), Some(Language::Es));
        assert_eq!(Language::parse("EN"), Some(Language::En));
        assert_eq!(Language::parse("fr"), None);
    }

    #[test]
    fn cookie_selects_language_with_english_fallback() {
        let req = TestRequest::default()
            .cookie(Cookie::new(LANGUAGE_COOKIE, "es"))
            .to_http_request();
        assert_eq!(Language::from_request(&req), Language::Es);
        assert_eq!(Language::from_request(&req).labels().book, "Reservar");

        let req = TestRequest::default()
            .cookie(Cookie::new(LANGUAGE_COOKIE, "de"))
            .to_http_request();
        assert_eq!(Language::from_request(&req), Language::En);
        assert_eq!(Language::from_request(&TestRequest::default().to_http_request()), Language::En);
    }
}
