use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::app::error::CheckoutError;
use crate::utils::money;

pub const BASE_PRICE: f64 = 14.90;
pub const ORDER_BUMP_PRICE: f64 = 9.90;
pub const SECOND_ORDER_BUMP_PRICE: f64 = 14.90;

pub const ORDER_BUMP_TITLE: &str = "Acesso Total";
pub const SECOND_ORDER_BUMP_TITLE: &str = "2 Investigações";
pub const FREE_BONUS_TITLE: &str = "Bônus Gratuito";

/// What the customer submits on the order-entry step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderForm {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub order_bump: bool,
    pub second_order_bump: bool,
    pub free_bonus: bool,
}

impl OrderForm {
    pub fn total(&self) -> f64 {
        let mut total = BASE_PRICE;
        if self.order_bump {
            total += ORDER_BUMP_PRICE;
        }
        if self.second_order_bump {
            total += SECOND_ORDER_BUMP_PRICE;
        }
        total
    }

    pub fn line_items(&self, product_title: &str) -> Vec<LineItem> {
        let mut items = vec![LineItem::new(product_title, BASE_PRICE)];
        if self.order_bump {
            items.push(LineItem::new(ORDER_BUMP_TITLE, ORDER_BUMP_PRICE));
        }
        if self.free_bonus {
            items.push(LineItem::new(FREE_BONUS_TITLE, 0.0));
        }
        if self.second_order_bump {
            items.push(LineItem::new(SECOND_ORDER_BUMP_TITLE, SECOND_ORDER_BUMP_PRICE));
        }
        items
    }

    pub fn into_order(self, product_title: &str) -> Result<Order, CheckoutError> {
        let items = self.line_items(product_title);
        let amount = self.total();
        Order::new(
            self.name,
            self.email,
            self.phone,
            amount,
            items,
            self.free_bonus,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub title: String,
    pub price: f64,
}

impl LineItem {
    pub fn new(title: impl Into<String>, price: f64) -> Self {
        Self {
            title: title.into(),
            price,
        }
    }
}

/// An order ready for payment. Immutable once built.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    order_id: String,
    customer_name: String,
    customer_email: String,
    customer_phone: String,
    amount: f64,
    items: Vec<LineItem>,
    bonus_opt_in: bool,
}

impl Order {
    pub fn new(
        customer_name: String,
        customer_email: String,
        customer_phone: String,
        amount: f64,
        items: Vec<LineItem>,
        bonus_opt_in: bool,
    ) -> Result<Self, CheckoutError> {
        if !money::is_valid_amount(amount) {
            return Err(CheckoutError::InvalidAmount(amount));
        }
        Ok(Self {
            order_id: generate_order_id(),
            customer_name,
            customer_email,
            customer_phone,
            amount,
            items,
            bonus_opt_in,
        })
    }

    /// A single-item order, as the CLI builds it.
    pub fn simple(
        customer_name: impl Into<String>,
        customer_email: impl Into<String>,
        customer_phone: impl Into<String>,
        amount: f64,
    ) -> Result<Self, CheckoutError> {
        Self::new(
            customer_name.into(),
            customer_email.into(),
            customer_phone.into(),
            amount,
            Vec::new(),
            false,
        )
    }

    pub fn with_bonus_opt_in(mut self, opt_in: bool) -> Self {
        self.bonus_opt_in = opt_in;
        self
    }

    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    pub fn customer_name(&self) -> &str {
        &self.customer_name
    }

    pub fn customer_email(&self) -> &str {
        &self.customer_email
    }

    pub fn customer_phone(&self) -> &str {
        &self.customer_phone
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn amount_cents(&self) -> u64 {
        money::to_cents(self.amount)
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn bonus_opt_in(&self) -> bool {
        self.bonus_opt_in
    }
}

/// `PIX` followed by the last 8 digits of the current Unix time in milliseconds.
pub fn generate_order_id() -> String {
    let millis = Utc::now().timestamp_millis().to_string();
    let tail = &millis[millis.len().saturating_sub(8)..];
    format!("PIX{}", tail)
}
