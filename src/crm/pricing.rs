//! Quotation pricing, numbering and slugs.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;

use crate::models::{Deliverable, LineItem, PriceOverride, QuotationData, Service};

/// Totals that differ by more than this are rewritten by a recalculation pass.
pub const RECALC_TOLERANCE: f64 = 0.01;
pub const SLUG_ATTEMPTS: usize = 10;

fn service_price(service: &Service, package: &str) -> f64 {
    match package {
        "basic" => service.basic_price,
        "premium" => service.premium_price,
        "elite" => service.elite_price,
        _ => 0.0,
    }
}

fn deliverable_price(deliverable: &Deliverable, package: &str) -> f64 {
    match package {
        "basic" => deliverable.basic_total_price,
        "premium" => deliverable.premium_total_price,
        "elite" => deliverable.elite_total_price,
        _ => 0.0,
    }
}

fn service_override(o: &PriceOverride, package: &str) -> Option<f64> {
    match package {
        "basic" => o.basic_price,
        "premium" => o.premium_price,
        "elite" => o.elite_price,
        _ => None,
    }
}

fn deliverable_override(o: &PriceOverride, package: &str) -> Option<f64> {
    match package {
        "basic" => o.basic_total_price,
        "premium" => o.premium_total_price,
        "elite" => o.elite_total_price,
        _ => None,
    }
}

/// Total for a quotation payload against the current catalogue.
///
/// A `custom` quotation is the sum of its custom services, repeated per event.
/// Otherwise each event is priced at its own package (or the default one) with
/// its own line items (or the global ones). Unknown catalogue ids add nothing.
pub fn calculate_total(data: &QuotationData, services: &[Service], deliverables: &[Deliverable]) -> f64 {
    if data.default_package == "custom" {
        let per_event: f64 = data
            .custom_services
            .iter()
            .map(|s| s.price * s.quantity)
            .sum();
        return per_event * data.events.len() as f64;
    }

    let services: HashMap<i64, &Service> = services.iter().map(|s| (s.id, s)).collect();
    let deliverables: HashMap<i64, &Deliverable> = deliverables.iter().map(|d| (d.id, d)).collect();

    data.events
        .iter()
        .map(|event| {
            let package = if event.selected_package == "default" {
                data.default_package.as_str()
            } else {
                event.selected_package.as_str()
            };

            let lines: &[LineItem] = if event.selected_services.is_empty() {
                &data.selected_services
            } else {
                &event.selected_services
            };
            let services_total: f64 = lines
                .iter()
                .filter_map(|line| {
                    let service = services.get(&line.id)?;
                    let price = event
                        .service_overrides
                        .get(&line.id)
                        .or_else(|| data.service_overrides.get(&line.id))
                        .and_then(|o| service_override(o, package))
                        .unwrap_or_else(|| service_price(service, package));
                    Some(price * line.quantity)
                })
                .sum();

            let lines: &[LineItem] = if event.selected_deliverables.is_empty() {
                &data.selected_deliverables
            } else {
                &event.selected_deliverables
            };
            let deliverables_total: f64 = lines
                .iter()
                .filter_map(|line| {
                    let deliverable = deliverables.get(&line.id)?;
                    let price = event
                        .package_overrides
                        .get(&line.id)
                        .and_then(|o| deliverable_override(o, package))
                        .unwrap_or_else(|| deliverable_price(deliverable, package));
                    Some(price * line.quantity)
                })
                .sum();

            services_total + deliverables_total
        })
        .sum()
}

/// `QT-{yyyy}-{nnnn}`
pub fn quotation_number(year: i32, existing: i64) -> String {
    format!("QT-{}-{:04}", year, existing + 1)
}

/// `L{yyyy}-{nnnn}`
pub fn lead_number(year: i32, existing: i64) -> String {
    format!("L{}-{:04}", year, existing + 1)
}

/// Quotation number lowercased with non-alphanumerics replaced by `-`.
pub fn slug_base(quotation_number: &str) -> String {
    quotation_number
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

pub fn slug_candidate<R: Rng>(base: &str, rng: &mut R) -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let suffix: String = (0..6)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect();
    format!("{}-{}", base, suffix)
}

/// Used once every random candidate collided.
pub fn slug_fallback(base: &str, now: DateTime<Utc>) -> String {
    format!("{}-{}", base, now.timestamp_millis())
}

/// `"{cc} {number}"`, or just the number when there is no country code.
pub fn format_phone(country_code: &str, number: &str) -> String {
    let cc = country_code.trim();
    let number = number.trim();
    if cc.is_empty() {
        number.to_string()
    } else {
        format!("{} {}", cc, number)
    }
}

pub fn package_display_name(package: &str) -> &'static str {
    match package {
        "basic" => "Basic Package",
        "premium" => "Premium Package",
        "elite" => "Elite Package",
        "custom" => "Custom Package",
        _ => "Unknown Package",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NextAction {
    Generate,
    View,
    Remind,
    Contract,
    Revise,
    Renew,
}

/// What to do next with a lead's quotation, from its status and age.
pub fn next_action(status: Option<&str>, created_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> NextAction {
    let Some(status) = status else {
        return NextAction::Generate;
    };
    let age_days = created_at.map(|c| (now - c).num_days()).unwrap_or(0);

    match status {
        "sent" if age_days > 7 => NextAction::Remind,
        "approved" => NextAction::Contract,
        "rejected" => NextAction::Revise,
        "expired" if age_days > 45 => NextAction::Renew,
        "expired" => NextAction::Revise,
        _ => NextAction::View,
    }
}

pub fn rate(part: i64, whole: i64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        ((part as f64 / whole as f64) * 10000.0).round() / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CustomService, QuotationEventData};
    use chrono::Duration;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn service(id: i64, basic: f64, premium: f64, elite: f64) -> Service {
        Service {
            id,
            servicename: format!("Service {}", id),
            category: None,
            description: None,
            basic_price: basic,
            premium_price: premium,
            elite_price: elite,
            status: "Active".into(),
        }
    }

    fn deliverable(id: i64, basic: f64, premium: f64, elite: f64) -> Deliverable {
        Deliverable {
            id,
            deliverable_name: format!("Deliverable {}", id),
            deliverable_cat: "Main".into(),
            deliverable_type: "Photo".into(),
            process_name: None,
            basic_total_price: basic,
            premium_total_price: premium,
            elite_total_price: elite,
            is_active: true,
        }
    }

    fn line(id: i64, quantity: f64) -> LineItem {
        LineItem { id, quantity }
    }

    fn event(package: &str) -> QuotationEventData {
        QuotationEventData {
            event_name: "Wedding".into(),
            selected_package: package.into(),
            ..Default::default()
        }
    }

    fn data(package: &str, events: Vec<QuotationEventData>) -> QuotationData {
        QuotationData {
            client_name: "Anu".into(),
            mobile: "9876543210".into(),
            default_package: package.into(),
            events,
            ..Default::default()
        }
    }

    // -------------------------------------------------------------------------
    // Totals
    // -------------------------------------------------------------------------

    #[test]
    fn test_custom_package_total() {
        let mut d = data("custom", vec![event("default"), event("default")]);
        d.custom_services = vec![
            CustomService {
                name: "Drone".into(),
                price: 5000.0,
                quantity: 2.0,
                package_type: None,
            },
            CustomService {
                name: "Album".into(),
                price: 1500.0,
                quantity: 1.0,
                package_type: None,
            },
        ];
        assert_eq!(calculate_total(&d, &[], &[]), 23000.0);
    }

    #[test]
    fn test_event_uses_default_package_and_global_lines() {
        let services = vec![service(1, 1000.0, 2000.0, 3000.0)];
        let deliverables = vec![deliverable(10, 500.0, 800.0, 1200.0)];
        let mut d = data("premium", vec![event("default"), event("elite")]);
        d.selected_services = vec![line(1, 2.0)];
        d.selected_deliverables = vec![line(10, 1.0)];

        // premium: 2*2000 + 800; elite: 2*3000 + 1200
        assert_eq!(calculate_total(&d, &services, &deliverables), 4800.0 + 7200.0);
    }

    #[test]
    fn test_event_lines_and_overrides() {
        let services = vec![service(1, 1000.0, 2000.0, 3000.0), service(2, 400.0, 600.0, 900.0)];
        let deliverables = vec![deliverable(10, 500.0, 800.0, 1200.0)];

        let mut e = event("basic");
        e.selected_services = vec![line(1, 1.0), line(2, 3.0)];
        e.selected_deliverables = vec![line(10, 2.0)];
        e.service_overrides.insert(
            1,
            PriceOverride {
                basic_price: Some(1500.0),
                ..Default::default()
            },
        );
        e.package_overrides.insert(
            10,
            PriceOverride {
                basic_total_price: Some(450.0),
                ..Default::default()
            },
        );

        let mut d = data("premium", vec![e]);
        d.service_overrides.insert(
            2,
            PriceOverride {
                basic_price: Some(350.0),
                ..Default::default()
            },
        );
        d.selected_services = vec![line(2, 100.0)];

        // 1500 + 3*350 + 2*450
        assert_eq!(calculate_total(&d, &services, &deliverables), 3450.0);
    }

    #[test]
    fn test_override_without_package_field_uses_catalogue() {
        let services = vec![service(1, 1000.0, 2000.0, 3000.0)];
        let mut e = event("elite");
        e.selected_services = vec![line(1, 1.0)];
        e.service_overrides.insert(
            1,
            PriceOverride {
                basic_price: Some(1.0),
                ..Default::default()
            },
        );
        let d = data("basic", vec![e]);
        assert_eq!(calculate_total(&d, &services, &[]), 3000.0);
    }

    #[test]
    fn test_unknown_ids_contribute_nothing() {
        let mut d = data("basic", vec![event("default")]);
        d.selected_services = vec![line(404, 5.0)];
        d.selected_deliverables = vec![line(405, 5.0)];
        assert_eq!(calculate_total(&d, &[], &[]), 0.0);
    }

    #[test]
    fn test_no_events_is_zero() {
        let mut d = data("basic", vec![]);
        d.selected_services = vec![line(1, 1.0)];
        assert_eq!(calculate_total(&d, &[service(1, 10.0, 20.0, 30.0)], &[]), 0.0);
    }

    // -------------------------------------------------------------------------
    // Numbers, slugs, phones
    // -------------------------------------------------------------------------

    #[test]
    fn test_numbering() {
        assert_eq!(quotation_number(2024, 0), "QT-2024-0001");
        assert_eq!(quotation_number(2024, 41), "QT-2024-0042");
        assert_eq!(lead_number(2025, 9), "L2025-0010");
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug_base("QT-2024-0001"), "qt-2024-0001");
        assert_eq!(slug_base("QT 2024/01"), "qt-2024-01");

        let mut rng = StdRng::seed_from_u64(3);
        let slug = slug_candidate("qt-2024-0001", &mut rng);
        let suffix = slug.strip_prefix("qt-2024-0001-").unwrap();
        assert_eq!(suffix.len(), 6);
        assert!(suffix.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));

        let now = Utc::now();
        assert_eq!(
            slug_fallback("qt-1", now),
            format!("qt-1-{}", now.timestamp_millis())
        );
    }

    #[test]
    fn test_format_phone() {
        assert_eq!(format_phone("+91", "9876543210"), "+91 9876543210");
        assert_eq!(format_phone("", "9876543210"), "9876543210");
    }

    #[test]
    fn test_package_names() {
        assert_eq!(package_display_name("basic"), "Basic Package");
        assert_eq!(package_display_name("custom"), "Custom Package");
    }

    // -------------------------------------------------------------------------
    // Next action
    // -------------------------------------------------------------------------

    #[test]
    fn test_next_action() {
        let now = Utc::now();
        let days = |n| Some(now - Duration::days(n));
        assert_eq!(next_action(None, None, now), NextAction::Generate);
        assert_eq!(next_action(Some("draft"), days(30), now), NextAction::View);
        assert_eq!(next_action(Some("sent"), days(3), now), NextAction::View);
        assert_eq!(next_action(Some("sent"), days(8), now), NextAction::Remind);
        assert_eq!(next_action(Some("approved"), days(1), now), NextAction::Contract);
        assert_eq!(next_action(Some("rejected"), days(1), now), NextAction::Revise);
        assert_eq!(next_action(Some("expired"), days(20), now), NextAction::Revise);
        assert_eq!(next_action(Some("expired"), days(46), now), NextAction::Renew);
    }

    #[test]
    fn test_rate() {
        assert_eq!(rate(1, 3), 33.33);
        assert_eq!(rate(0, 0), 0.0);
        assert_eq!(rate(5, 5), 100.0);
    }
}
