use std::collections::{BTreeMap, BTreeSet};

use crate::cart_actor::Cart;
use crate::domain::{ProductId, SubjectId, VariantId};

/// How much of one subject is wanted, and by which products.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Need {
    pub quantity: u32,
    pub products: BTreeSet<ProductId>,
}

/// The subjects a reconciler tracks and the quantity wanted of each.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Demand {
    needs: BTreeMap<SubjectId, Need>,
}

impl Demand {
    pub fn from_cart(cart: &Cart) -> Self {
        let mut needs: BTreeMap<SubjectId, Need> = BTreeMap::new();
        for line in cart.lines() {
            let need = needs.entry(line.key().subject()).or_default();
            need.quantity += line.quantity;
            need.products.insert(line.product_id.clone());
        }
        Self { needs }
    }

    /// Demand of a passive badge: one unit of each listed product and variant.
    pub fn for_subjects(product_ids: &[ProductId], variant_ids: &[VariantId]) -> Self {
        let products = product_ids.iter().map(|id| {
            let need = Need {
                quantity: 1,
                products: BTreeSet::from([id.clone()]),
            };
            (SubjectId::Product(id.clone()), need)
        });
        let variants = variant_ids.iter().map(|id| {
            let need = Need {
                quantity: 1,
                products: BTreeSet::new(),
            };
            (SubjectId::Variant(id.clone()), need)
        });
        Self {
            needs: products.chain(variants).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.needs.is_empty()
    }

    /// Composition of the demand; a change here calls for a fresh fetch.
    pub fn subjects(&self) -> BTreeSet<SubjectId> {
        self.needs.keys().cloned().collect()
    }

    pub fn needs(&self) -> impl Iterator<Item = (&SubjectId, &Need)> {
        self.needs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor_framework::Entity;
    use crate::cart_actor::{CartAction, CartCreate};
    use crate::domain::{CartId, Currency, NewLineItem};
    use rust_decimal::Decimal;

    #[test]
    fn cart_demand_sums_quantities_per_subject() {
        let mut cart = Cart::from_create_params(CartId::new("cart_1"), CartCreate::default()).unwrap();
        let tee = NewLineItem::new("tee", Decimal::from(250), Currency::inr());
        cart.handle_action(CartAction::Add { item: tee.clone(), quantity: 2 }).unwrap();
        cart.handle_action(CartAction::Add { item: tee.with_variant("tee-xl"), quantity: 1 }).unwrap();

        let demand = Demand::from_cart(&cart);
        let needs: Vec<(String, u32)> = demand
            .needs()
            .map(|(subject, need)| (subject.to_string(), need.quantity))
            .collect();

        assert_eq!(
            needs,
            vec![("product:tee".to_string(), 2), ("variant:tee-xl".to_string(), 1)]
        );
    }

    #[test]
    fn quantity_changes_keep_the_composition() {
        let mut cart = Cart::from_create_params(CartId::new("cart_1"), CartCreate::default()).unwrap();
        let tee = NewLineItem::new("tee", Decimal::from(250), Currency::inr());
        cart.handle_action(CartAction::Add { item: tee, quantity: 1 }).unwrap();
        let before = Demand::from_cart(&cart);

        cart.handle_action(CartAction::SetQuantity(crate::domain::LineKey::product("tee"), 4)).unwrap();
        let after = Demand::from_cart(&cart);

        assert_ne!(before, after);
        assert_eq!(before.subjects(), after.subjects());
    }
}
