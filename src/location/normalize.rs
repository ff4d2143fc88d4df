//! Region name → two-letter code normalization (Brazilian federative units).
//!
//! Unknown input passes through unchanged so that odd region data never sinks an
//! otherwise good strategy result.

const REGION_CODES: &[(&str, &str)] = &[
    ("acre", "AC"),
    ("alagoas", "AL"),
    ("amapá", "AP"),
    ("amazonas", "AM"),
    ("bahia", "BA"),
    ("ceará", "CE"),
    ("distrito federal", "DF"),
    ("espírito santo", "ES"),
    ("goiás", "GO"),
    ("maranhão", "MA"),
    ("mato grosso", "MT"),
    ("mato grosso do sul", "MS"),
    ("minas gerais", "MG"),
    ("pará", "PA"),
    ("paraíba", "PB"),
    ("paraná", "PR"),
    ("pernambuco", "PE"),
    ("piauí", "PI"),
    ("rio de janeiro", "RJ"),
    ("rio grande do norte", "RN"),
    ("rio grande do sul", "RS"),
    ("rondônia", "RO"),
    ("roraima", "RR"),
    ("santa catarina", "SC"),
    ("são paulo", "SP"),
    ("sergipe", "SE"),
    ("tocantins", "TO"),
    // Common unaccented spellings returned by IP providers.
    ("amapa", "AP"),
    ("ceara", "CE"),
    ("espirito santo", "ES"),
    ("goias", "GO"),
    ("maranhao", "MA"),
    ("para", "PA"),
    ("paraiba", "PB"),
    ("parana", "PR"),
    ("piaui", "PI"),
    ("rondonia", "RO"),
    ("sao paulo", "SP"),
    ("federal district", "DF"),
    ("state of sao paulo", "SP"),
    ("state of são paulo", "SP"),
];

/// Normalize a raw region value to its canonical two-letter code.
pub fn normalize_region(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.chars().count() == 2 {
        return trimmed.to_uppercase();
    }

    let key = trimmed.to_lowercase();
    REGION_CODES
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, code)| code.to_string())
        .unwrap_or_else(|| trimmed.to_string())
}
