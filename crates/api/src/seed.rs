//! Demo catalog and promo codes for local runs.

use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use common::{Sku, VariantId};
use domain::{Discount, DomainError, Money, NewProduct, NewPromo, Variant};
use store::DocumentStore;

use crate::AppState;

struct DemoVariant {
    id: &'static str,
    name: &'static str,
    cents: i64,
    sku: &'static str,
    inventory: u32,
    attributes: &'static [(&'static str, &'static str)],
}

struct DemoProduct {
    name: &'static str,
    description: &'static str,
    category: &'static str,
    base_cents: i64,
    variants: &'static [DemoVariant],
    images: &'static [&'static str],
}

const PRODUCTS: &[DemoProduct] = &[
    DemoProduct {
        name: "Wireless Bluetooth Headphones",
        description: "High-quality wireless headphones with noise cancellation and 30-hour battery life.",
        category: "Electronics",
        base_cents: 19_999,
        variants: &[
            DemoVariant {
                id: "headphones-black",
                name: "Black",
                cents: 19_999,
                sku: "WBH-BLACK-001",
                inventory: 50,
                attributes: &[("color", "black")],
            },
            DemoVariant {
                id: "headphones-white",
                name: "White",
                cents: 19_999,
                sku: "WBH-WHITE-001",
                inventory: 30,
                attributes: &[("color", "white")],
            },
            DemoVariant {
                id: "headphones-blue",
                name: "Blue",
                cents: 21_999,
                sku: "WBH-BLUE-001",
                inventory: 25,
                attributes: &[("color", "blue")],
            },
        ],
        images: &["https://images.unsplash.com/photo-1505740420928-5e560c06d30e?w=500"],
    },
    DemoProduct {
        name: "Premium Cotton T-Shirt",
        description: "Soft, comfortable cotton t-shirt made from 100% organic cotton.",
        category: "Clothing",
        base_cents: 2_999,
        variants: &[
            DemoVariant {
                id: "tshirt-red-m",
                name: "Red - Medium",
                cents: 2_999,
                sku: "PCT-RED-M",
                inventory: 150,
                attributes: &[("color", "red"), ("size", "M")],
            },
            DemoVariant {
                id: "tshirt-blue-l",
                name: "Blue - Large",
                cents: 2_999,
                sku: "PCT-BLUE-L",
                inventory: 75,
                attributes: &[("color", "blue"), ("size", "L")],
            },
        ],
        images: &["https://images.unsplash.com/photo-1521572163474-6864f9cf17ab?w=500"],
    },
    DemoProduct {
        name: "Smart Fitness Watch",
        description: "Advanced fitness tracker with heart rate monitoring, GPS, and 7-day battery life.",
        category: "Electronics",
        base_cents: 29_999,
        variants: &[
            DemoVariant {
                id: "watch-black-42mm",
                name: "Black - 42mm",
                cents: 29_999,
                sku: "SFW-BLACK-42",
                inventory: 40,
                attributes: &[("color", "black"), ("size", "42mm")],
            },
            DemoVariant {
                id: "watch-black-46mm",
                name: "Black - 46mm",
                cents: 32_999,
                sku: "SFW-BLACK-46",
                inventory: 30,
                attributes: &[("color", "black"), ("size", "46mm")],
            },
        ],
        images: &["https://images.unsplash.com/photo-1523275335684-37898b6baf30?w=500"],
    },
    DemoProduct {
        name: "Leather Wallet",
        description: "Genuine leather wallet with RFID blocking technology and multiple card slots.",
        category: "Accessories",
        base_cents: 7_999,
        variants: &[DemoVariant {
            id: "wallet-brown",
            name: "Brown Leather",
            cents: 7_999,
            sku: "LW-BROWN-001",
            inventory: 60,
            attributes: &[("color", "brown"), ("material", "leather")],
        }],
        images: &[],
    },
    DemoProduct {
        name: "Yoga Mat",
        description: "Non-slip yoga mat made from eco-friendly materials.",
        category: "Sports",
        base_cents: 4_999,
        variants: &[
            DemoVariant {
                id: "yoga-purple",
                name: "Purple",
                cents: 4_999,
                sku: "YM-PURPLE-001",
                inventory: 45,
                attributes: &[("color", "purple"), ("thickness", "6mm")],
            },
            DemoVariant {
                id: "yoga-blue",
                name: "Blue",
                cents: 5_499,
                sku: "YM-BLUE-001",
                inventory: 40,
                attributes: &[("color", "blue"), ("thickness", "8mm")],
            },
        ],
        images: &[],
    },
];

fn demo_promos() -> Vec<NewPromo> {
    let now = Utc::now();
    let promo = |code: &str,
                 name: &str,
                 discount: Discount,
                 minimum: i64,
                 days: i64,
                 usage_limit: Option<u32>| NewPromo {
        code: code.to_string(),
        name: name.to_string(),
        discount,
        minimum_order_amount: Some(Money::from_cents(minimum)),
        valid_from: now,
        valid_until: now + Duration::days(days),
        usage_limit,
        is_active: true,
    };

    vec![
        promo(
            "WELCOME10",
            "Welcome 10% Off",
            Discount::Percentage {
                basis_points: 1000,
                max_discount: Some(Money::from_dollars(20)),
            },
            5_000,
            30,
            Some(1000),
        ),
        promo(
            "SAVE25",
            "Save $25 on Orders Over $100",
            Discount::Fixed {
                amount: Money::from_dollars(25),
            },
            10_000,
            60,
            Some(500),
        ),
        promo(
            "ELECTRONICS15",
            "15% Off Electronics",
            Discount::Percentage {
                basis_points: 1500,
                max_discount: Some(Money::from_dollars(50)),
            },
            7_500,
            14,
            Some(200),
        ),
        promo(
            "FREESHIP",
            "Free Shipping",
            Discount::Fixed {
                amount: Money::from_cents(999),
            },
            5_000,
            90,
            None,
        ),
    ]
}

fn to_new_product(demo: &DemoProduct) -> NewProduct {
    NewProduct {
        name: demo.name.to_string(),
        description: demo.description.to_string(),
        category: demo.category.to_string(),
        base_price: Money::from_cents(demo.base_cents),
        variants: demo
            .variants
            .iter()
            .map(|v| Variant {
                id: VariantId::new(v.id),
                name: v.name.to_string(),
                price: Money::from_cents(v.cents),
                sku: Sku::new(v.sku),
                inventory: v.inventory,
                attributes: v
                    .attributes
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<BTreeMap<_, _>>(),
            })
            .collect(),
        images: demo.images.iter().map(|i| i.to_string()).collect(),
    }
}

/// Seeds sample products and promo codes.
///
/// Entries that already exist (same SKU or code) are skipped, so seeding
/// twice is harmless.
#[tracing::instrument(skip(state))]
pub async fn seed_demo_data<S: DocumentStore + Clone>(
    state: &AppState<S>,
) -> Result<(), DomainError> {
    let mut products = 0;
    for demo in PRODUCTS {
        match state.catalog.create_product(to_new_product(demo)).await {
            Ok(_) => products += 1,
            Err(DomainError::Conflict(reason)) => {
                tracing::debug!(name = demo.name, %reason, "demo product already present");
            }
            Err(e) => return Err(e),
        }
    }

    let mut promos = 0;
    for input in demo_promos() {
        let code = input.code.clone();
        match state.promotions.create_promo(input).await {
            Ok(_) => promos += 1,
            Err(DomainError::Conflict(_)) => {
                tracing::debug!(%code, "demo promo already present");
            }
            Err(e) => return Err(e),
        }
    }

    tracing::info!(products, promos, "demo data seeded");
    Ok(())
}
