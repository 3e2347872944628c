//! Static country and currency reference data.
//!
//! The approved country list students may pick from, with each country's
//! ISO 4217 currency code. Lookups are case-insensitive and trimmed.

/// Approved countries with their currency codes, alphabetical by country.
const COUNTRY_CURRENCY: &[(&str, &str)] = &[
    ("Argentina", "ARS"),
    ("Australia", "AUD"),
    ("Austria", "EUR"),
    ("Bahamas", "BSD"),
    ("Belgium", "EUR"),
    ("Brazil", "BRL"),
    ("Bulgaria", "BGN"),
    ("Canada", "CAD"),
    ("Chile", "CLP"),
    ("China", "CNY"),
    ("Colombia", "COP"),
    ("Costa Rica", "CRC"),
    ("Croatia", "EUR"),
    ("Czech Republic", "CZK"),
    ("Denmark", "DKK"),
    ("Dominican Republic", "DOP"),
    ("Egypt", "EGP"),
    ("Estonia", "EUR"),
    ("Fiji", "FJD"),
    ("Finland", "EUR"),
    ("France", "EUR"),
    ("Germany", "EUR"),
    ("Ghana", "GHS"),
    ("Greece", "EUR"),
    ("Guatemala", "GTQ"),
    ("Honduras", "HNL"),
    ("Hungary", "HUF"),
    ("Iceland", "ISK"),
    ("India", "INR"),
    ("Indonesia", "IDR"),
    ("Ireland", "EUR"),
    ("Israel", "ILS"),
    ("Italy", "EUR"),
    ("Jamaica", "JMD"),
    ("Japan", "JPY"),
    ("Jordan", "JOD"),
    ("Kenya", "KES"),
    ("Kuwait", "KWD"),
    ("Latvia", "EUR"),
    ("Lithuania", "EUR"),
    ("Luxembourg", "EUR"),
    ("Malaysia", "MYR"),
    ("Mexico", "MXN"),
    ("Morocco", "MAD"),
    ("Netherlands", "EUR"),
    ("New Zealand", "NZD"),
    ("Nigeria", "NGN"),
    ("Norway", "NOK"),
    ("Oman", "OMR"),
    ("Pakistan", "PKR"),
    ("Panama", "PAB"),
    ("Peru", "PEN"),
    ("Philippines", "PHP"),
    ("Poland", "PLN"),
    ("Portugal", "EUR"),
    ("Qatar", "QAR"),
    ("Romania", "RON"),
    ("Saudi Arabia", "SAR"),
    ("Singapore", "SGD"),
    ("South Africa", "ZAR"),
    ("South Korea", "KRW"),
    ("Spain", "EUR"),
    ("Sweden", "SEK"),
    ("Switzerland", "CHF"),
    ("Thailand", "THB"),
    ("Turkey", "TRY"),
    ("Ukraine", "UAH"),
    ("United Arab Emirates", "AED"),
    ("United Kingdom", "GBP"),
    ("United States", "USD"),
    ("Uruguay", "UYU"),
    ("Vietnam", "VND"),
];

/// Look up a country by name, returning `(canonical_name, currency_code)`.
///
/// Matching is case-insensitive and trims surrounding whitespace, so a
/// student entering `"  denmark "` resolves to `("Denmark", "DKK")`.
pub fn country_entry(name: &str) -> Option<(&'static str, &'static str)> {
    let wanted = name.trim();
    if wanted.is_empty() {
        return None;
    }
    COUNTRY_CURRENCY
        .iter()
        .find(|(country, _)| country.eq_ignore_ascii_case(wanted))
        .copied()
}

/// Currency code for an approved country, if the country is on the list.
pub fn currency_for_country(name: &str) -> Option<&'static str> {
    country_entry(name).map(|(_, code)| code)
}

/// Whether `code` is a currency code used by at least one approved country.
pub fn is_valid_code(code: &str) -> bool {
    let wanted = code.trim();
    COUNTRY_CURRENCY
        .iter()
        .any(|(_, c)| c.eq_ignore_ascii_case(wanted))
}
