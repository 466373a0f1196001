//! Product price derivation.

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Discounts are percentages; anything outside `[0, 100]` is pulled back in.
pub fn clamp_discount(discount: f64) -> f64 {
    if discount.is_nan() {
        return 0.0;
    }
    discount.clamp(0.0, 100.0)
}

pub fn sale_price(original_price: f64, discount: f64) -> f64 {
    let discount = clamp_discount(discount);
    let price = if original_price > 0.0 && discount > 0.0 {
        round2(original_price * (1.0 - discount / 100.0))
    } else {
        round2(original_price)
    };
    price.max(0.0)
}
