//! Built-in catalog served by public read endpoints when `DEMO_MODE` is on.

use crate::models::{Category, Combo, Service};
use sqlx::types::Json;

pub fn categories() -> Vec<Category> {
    [(1, "Sobrancelhas"), (2, "Cílios"), (3, "Pele")]
        .into_iter()
        .enumerate()
        .map(|(i, (id, name))| Category {
            id,
            name: name.into(),
            sort_order: i as i64,
            is_active: true,
        })
        .collect()
}

fn service(id: i64, name: &str, description: &str, price: f64, duration_min: i64, category_id: i64) -> Service {
    Service {
        id,
        name: name.into(),
        description: description.into(),
        price,
        duration_min,
        category_id: Some(category_id),
        image_url: None,
        is_active: true,
        sort_order: id,
    }
}

pub fn services() -> Vec<Service> {
    vec![
        service(1, "Design de sobrancelha", "Modelagem com pinça e linha", 45.0, 30, 1),
        service(2, "Henna", "Coloração temporária dos fios", 35.0, 30, 1),
        service(3, "Lash lifting", "Curvatura natural dos cílios", 120.0, 60, 2),
        service(4, "Extensão fio a fio", "Aplicação clássica", 180.0, 120, 2),
        service(5, "Limpeza de pele", "Limpeza profunda com extração", 150.0, 90, 3),
    ]
}

pub fn combos() -> Vec<Combo> {
    vec![
        Combo {
            id: 1,
            name: "Olhar completo".into(),
            description: "Design de sobrancelha, henna e lash lifting".into(),
            service_ids: Json(vec![1, 2, 3]),
            price: 180.0,
            is_active: true,
        },
        Combo {
            id: 2,
            name: "Dia de cuidado".into(),
            description: "Limpeza de pele e design de sobrancelha".into(),
            service_ids: Json(vec![1, 5]),
            price: 175.0,
            is_active: true,
        },
    ]
}

/// Reply used by the chat widget when no completion provider is available.
pub const CHAT_REPLY: &str = "Olá! Sou a assistente da Sparkles. No momento estou em modo \
demonstração, mas você pode conferir nossos serviços e agendar pelo site. Qualquer dúvida, \
fale com a gente pelo WhatsApp!";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_services_reference_demo_categories() {
        let category_ids: Vec<i64> = categories().iter().map(|c| c.id).collect();
        for svc in services() {
            assert!(category_ids.contains(&svc.category_id.unwrap()));
        }
    }

    #[test]
    fn test_demo_combos_reference_demo_services() {
        let service_ids: Vec<i64> = services().iter().map(|s| s.id).collect();
        for combo in combos() {
            assert!(combo.service_ids.iter().all(|id| service_ids.contains(id)));
        }
    }
}
