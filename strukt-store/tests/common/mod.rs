#![allow(dead_code)]

use strukt_store::schema::{ScalarKind, Structure, TypeDescriptor, ValueDescriptor};
use uuid::Uuid;

strukt_store::structure! {
    pub struct Order {
        pub order_id: i64,
        pub amount: f64,
        pub reference: String,
        pub shipping: Address,
    }
}

strukt_store::structure! {
    pub struct Address {
        pub city: String,
        pub zip: String,
    }
}

strukt_store::structure! {
    pub struct Invoice {
        pub structure_id: Uuid,
        pub value: String,
        pub nested_structure: Option<LedgerEntry>,
        pub nested_object: Option<Note>,
    }
}

strukt_store::structure! {
    pub struct LedgerEntry {
        pub structure_id: Uuid,
        pub value: String,
    }
}

strukt_store::structure! {
    pub struct Note {
        pub value: String,
    }
}

strukt_store::structure! {
    pub struct Profile {
        pub profile_id: i64,
        pub nickname: Option<String>,
        pub home: Option<Address>,
    }
}

// The unique-constrained path is declared through the descriptor directly;
// the macro covers the common unconstrained case.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Account {
    pub account_id: i64,
    pub email: String,
}

impl Structure for Account {
    fn type_descriptor() -> &'static TypeDescriptor {
        static DESCRIPTOR: std::sync::OnceLock<TypeDescriptor> = std::sync::OnceLock::new();

        DESCRIPTOR.get_or_init(|| {
            TypeDescriptor::new("Account")
                .field("account_id", ValueDescriptor::Scalar(ScalarKind::Int))
                .unique_field("email", ValueDescriptor::Scalar(ScalarKind::Text))
        })
    }
}

pub fn order(reference: &str, amount: f64, city: &str) -> Order {
    Order {
        order_id: 0,
        amount,
        reference: reference.to_owned(),
        shipping: Address {
            city: city.to_owned(),
            zip: "111 11".to_owned(),
        },
    }
}

pub fn invoice(id: Uuid, value: &str, nested_value: &str, note: &str) -> Invoice {
    Invoice {
        structure_id: id,
        value: value.to_owned(),
        nested_structure: Some(LedgerEntry {
            structure_id: Uuid::new_v4(),
            value: nested_value.to_owned(),
        }),
        nested_object: Some(Note {
            value: note.to_owned(),
        }),
    }
}
