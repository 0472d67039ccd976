//! Baseline knowledge shipped with every instance.
//!
//! Seed ids are small integers that runtime-generated ids (millisecond based)
//! never reach, so a seed can only collide with another seed.

use chrono::{DateTime, Utc};

use crate::models::{KnowledgeKind, KnowledgeRecord};

/// Creation instant stamped on every seed record (2024-01-01T00:00:00Z).
pub const SEED_EPOCH_SECS: i64 = 1_704_067_200;

const SEED_ROWS: &[(i64, &str, &str, KnowledgeKind)] = &[
    // Chat
    (1, "merhaba", "Merhaba! Ben senin tarayıcında yaşayan, sunucusuz çalışan yapay zekayım.", KnowledgeKind::Chat),
    (2, "selam", "Selam! P2P ağına hoş geldin.", KnowledgeKind::Chat),
    (3, "nasılsın", "Sanal devrelerim harika çalışıyor. Senin için ne hesaplayabilirim?", KnowledgeKind::Chat),
    (4, "adın ne", "Bana \"Dağıtık Zeka\" diyebilirsin. Kodlarımda merkezi bir isim yok.", KnowledgeKind::Chat),
    (5, "neredesin", "Tam şu an senin cihazının RAM belleğindeyim ve diğer kullanıcılarla internet üzerinden konuşuyorum.", KnowledgeKind::Chat),
    // Math
    (10, "pi sayısı", "Pi sayısı matematikte yaklaşık 3.14159 olarak kabul edilir.", KnowledgeKind::Math),
    (11, "altın oran nedir", "Altın oran yaklaşık 1.618'dir. Doğada ve sanatta estetik mükemmellik ölçüsü olarak bilinir.", KnowledgeKind::Math),
    (12, "bir gün kaç saniye", "Bir gün tam olarak 86.400 saniyedir (24 x 60 x 60).", KnowledgeKind::Math),
    (13, "asal sayı nedir", "Sadece 1'e ve kendisine bölünebilen, 1'den büyük doğal sayılardır (Örn: 2, 3, 5, 7, 11).", KnowledgeKind::Math),
    (14, "üçgenin iç açıları", "Bir üçgenin iç açılarının toplamı her zaman 180 derecedir.", KnowledgeKind::Math),
    // General
    (20, "atatürk kimdir", "Mustafa Kemal Atatürk, Türkiye Cumhuriyeti'nin kurucusu ve ilk Cumhurbaşkanıdır.", KnowledgeKind::General),
    (21, "istanbulun fethi", "İstanbul 1453 yılında Fatih Sultan Mehmet tarafından fethedilmiştir.", KnowledgeKind::General),
    (22, "su formülü", "Suyun kimyasal formülü H2O'dur.", KnowledgeKind::General),
    (23, "sql nedir", "SQL, veritabanlarını yönetmek ve sorgulamak için kullanılan bir dildir. Ben de benzer bir mantıkla çalışıyorum.", KnowledgeKind::General),
];

pub fn seed_epoch() -> DateTime<Utc> {
    DateTime::from_timestamp(SEED_EPOCH_SECS, 0).unwrap_or_default()
}

/// The fixed seed set, in declaration order.
pub fn seed_records() -> Vec<KnowledgeRecord> {
    let created_at = seed_epoch();
    SEED_ROWS
        .iter()
        .map(|(id, pattern, response, kind)| KnowledgeRecord {
            id: *id,
            pattern: (*pattern).to_string(),
            response: (*response).to_string(),
            kind: *kind,
            created_at,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_seed_ids_are_unique() {
        let seeds = seed_records();
        let ids: HashSet<i64> = seeds.iter().map(|r| r.id).collect();
        assert_eq!(ids.len(), seeds.len());
    }

    #[test]
    fn test_seed_fields_are_trimmed_and_non_empty() {
        for record in seed_records() {
            assert!(!record.pattern.is_empty());
            assert_eq!(record.pattern, record.pattern.trim());
            assert!(!record.response.is_empty());
            assert_eq!(record.response, record.response.trim());
        }
    }
}
