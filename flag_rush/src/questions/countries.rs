//! Embedded country dataset.
//!
//! Countries are tiered by how recognizable their flag is; a difficulty's
//! pool is every country at or below that tier, so harder games draw from a
//! strictly larger set.

use super::Country;
use crate::room::Difficulty;

macro_rules! country {
    ($name:literal, $flag:literal, $code:literal, $region:literal) => {
        Country {
            name: $name,
            flag: $flag,
            code: $code,
            region: $region,
        }
    };
}

/// Tier 1: flags most players recognize on sight.
pub const EASY: &[Country] = &[
    country!("France", "🇫🇷", "FR", "Europe"),
    country!("Germany", "🇩🇪", "DE", "Europe"),
    country!("Italy", "🇮🇹", "IT", "Europe"),
    country!("Spain", "🇪🇸", "ES", "Europe"),
    country!("United Kingdom", "🇬🇧", "GB", "Europe"),
    country!("Netherlands", "🇳🇱", "NL", "Europe"),
    country!("Belgium", "🇧🇪", "BE", "Europe"),
    country!("Switzerland", "🇨🇭", "CH", "Europe"),
    country!("Sweden", "🇸🇪", "SE", "Europe"),
    country!("Norway", "🇳🇴", "NO", "Europe"),
    country!("Denmark", "🇩🇰", "DK", "Europe"),
    country!("Finland", "🇫🇮", "FI", "Europe"),
    country!("Portugal", "🇵🇹", "PT", "Europe"),
    country!("Greece", "🇬🇷", "GR", "Europe"),
    country!("Poland", "🇵🇱", "PL", "Europe"),
    country!("Ireland", "🇮🇪", "IE", "Europe"),
    country!("Austria", "🇦🇹", "AT", "Europe"),
    country!("Russia", "🇷🇺", "RU", "Europe"),
    country!("Turkey", "🇹🇷", "TR", "Europe"),
    country!("United States", "🇺🇸", "US", "Americas"),
    country!("Canada", "🇨🇦", "CA", "Americas"),
    country!("Mexico", "🇲🇽", "MX", "Americas"),
    country!("Brazil", "🇧🇷", "BR", "Americas"),
    country!("Argentina", "🇦🇷", "AR", "Americas"),
    country!("Japan", "🇯🇵", "JP", "Asia"),
    country!("China", "🇨🇳", "CN", "Asia"),
    country!("India", "🇮🇳", "IN", "Asia"),
    country!("South Korea", "🇰🇷", "KR", "Asia"),
    country!("Thailand", "🇹🇭", "TH", "Asia"),
    country!("Vietnam", "🇻🇳", "VN", "Asia"),
    country!("Indonesia", "🇮🇩", "ID", "Asia"),
    country!("Saudi Arabia", "🇸🇦", "SA", "Asia"),
    country!("Israel", "🇮🇱", "IL", "Asia"),
    country!("Egypt", "🇪🇬", "EG", "Africa"),
    country!("South Africa", "🇿🇦", "ZA", "Africa"),
    country!("Nigeria", "🇳🇬", "NG", "Africa"),
    country!("Kenya", "🇰🇪", "KE", "Africa"),
    country!("Morocco", "🇲🇦", "MA", "Africa"),
    country!("Australia", "🇦🇺", "AU", "Oceania"),
    country!("New Zealand", "🇳🇿", "NZ", "Oceania"),
];

/// Tier 2: familiar but frequently confused.
pub const MEDIUM: &[Country] = &[
    country!("Ukraine", "🇺🇦", "UA", "Europe"),
    country!("Czechia", "🇨🇿", "CZ", "Europe"),
    country!("Hungary", "🇭🇺", "HU", "Europe"),
    country!("Romania", "🇷🇴", "RO", "Europe"),
    country!("Bulgaria", "🇧🇬", "BG", "Europe"),
    country!("Croatia", "🇭🇷", "HR", "Europe"),
    country!("Serbia", "🇷🇸", "RS", "Europe"),
    country!("Slovakia", "🇸🇰", "SK", "Europe"),
    country!("Slovenia", "🇸🇮", "SI", "Europe"),
    country!("Iceland", "🇮🇸", "IS", "Europe"),
    country!("Chile", "🇨🇱", "CL", "Americas"),
    country!("Colombia", "🇨🇴", "CO", "Americas"),
    country!("Peru", "🇵🇪", "PE", "Americas"),
    country!("Venezuela", "🇻🇪", "VE", "Americas"),
    country!("Uruguay", "🇺🇾", "UY", "Americas"),
    country!("Cuba", "🇨🇺", "CU", "Americas"),
    country!("Jamaica", "🇯🇲", "JM", "Americas"),
    country!("Philippines", "🇵🇭", "PH", "Asia"),
    country!("Malaysia", "🇲🇾", "MY", "Asia"),
    country!("Singapore", "🇸🇬", "SG", "Asia"),
    country!("Pakistan", "🇵🇰", "PK", "Asia"),
    country!("Bangladesh", "🇧🇩", "BD", "Asia"),
    country!("Iran", "🇮🇷", "IR", "Asia"),
    country!("Iraq", "🇮🇶", "IQ", "Asia"),
    country!("United Arab Emirates", "🇦🇪", "AE", "Asia"),
];

/// Tier 3: flags that take real geography knowledge.
pub const HARD: &[Country] = &[
    country!("Estonia", "🇪🇪", "EE", "Europe"),
    country!("Latvia", "🇱🇻", "LV", "Europe"),
    country!("Lithuania", "🇱🇹", "LT", "Europe"),
    country!("Belarus", "🇧🇾", "BY", "Europe"),
    country!("Moldova", "🇲🇩", "MD", "Europe"),
    country!("Albania", "🇦🇱", "AL", "Europe"),
    country!("North Macedonia", "🇲🇰", "MK", "Europe"),
    country!("Bosnia and Herzegovina", "🇧🇦", "BA", "Europe"),
    country!("Montenegro", "🇲🇪", "ME", "Europe"),
    country!("Georgia", "🇬🇪", "GE", "Asia"),
    country!("Armenia", "🇦🇲", "AM", "Asia"),
    country!("Azerbaijan", "🇦🇿", "AZ", "Asia"),
    country!("Kazakhstan", "🇰🇿", "KZ", "Asia"),
    country!("Uzbekistan", "🇺🇿", "UZ", "Asia"),
    country!("Mongolia", "🇲🇳", "MN", "Asia"),
    country!("Nepal", "🇳🇵", "NP", "Asia"),
    country!("Sri Lanka", "🇱🇰", "LK", "Asia"),
    country!("Myanmar", "🇲🇲", "MM", "Asia"),
    country!("Cambodia", "🇰🇭", "KH", "Asia"),
    country!("Laos", "🇱🇦", "LA", "Asia"),
];

/// Tier 4: deep-cut flags for completionists.
pub const EXPERT: &[Country] = &[
    country!("Bhutan", "🇧🇹", "BT", "Asia"),
    country!("Brunei", "🇧🇳", "BN", "Asia"),
    country!("Kiribati", "🇰🇮", "KI", "Oceania"),
    country!("Vanuatu", "🇻🇺", "VU", "Oceania"),
    country!("Tonga", "🇹🇴", "TO", "Oceania"),
    country!("Samoa", "🇼🇸", "WS", "Oceania"),
    country!("Palau", "🇵🇼", "PW", "Oceania"),
    country!("Comoros", "🇰🇲", "KM", "Africa"),
    country!("Djibouti", "🇩🇯", "DJ", "Africa"),
    country!("Eritrea", "🇪🇷", "ER", "Africa"),
    country!("Lesotho", "🇱🇸", "LS", "Africa"),
    country!("Eswatini", "🇸🇿", "SZ", "Africa"),
    country!("Suriname", "🇸🇷", "SR", "Americas"),
    country!("Guyana", "🇬🇾", "GY", "Americas"),
    country!("Belize", "🇧🇿", "BZ", "Americas"),
];

/// The country pool for a difficulty: every tier at or below it.
pub fn pool(difficulty: Difficulty) -> Vec<Country> {
    let tiers: &[&[Country]] = match difficulty {
        Difficulty::Easy => &[EASY],
        Difficulty::Medium => &[EASY, MEDIUM],
        Difficulty::Hard => &[EASY, MEDIUM, HARD],
        Difficulty::Expert => &[EASY, MEDIUM, HARD, EXPERT],
    };
    tiers.iter().flat_map(|t| t.iter().cloned()).collect()
}
