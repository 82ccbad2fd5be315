use crate::extract::truncate_chars;
use crate::quarters::QuarterKey;

/// Upper bound on digest characters embedded in a prompt.
pub const MAX_PROMPT_CONTENT_CHARS: usize = 8000;

const FIRST_QUARTER_KEYS: &str =
    "start_date, value_proposition, product_focus, marketing_copy, pricing_strategy, distribution_channels, revenue_projection";
const LATER_QUARTER_KEYS: &str =
    "marketing_copy, value_proposition, product_focus, pricing_strategy, changes, revenue_projection";

/// Prompt for the earliest quarter on record: profile the business from scratch.
pub fn first_quarter(content: &str, date: &str, quarter: &QuarterKey) -> String {
    format!(
        "Analyze this website snapshot from {date} ({quarter}) and extract:

1. **Business Start Date**: Based on the snapshot date, when did this business likely start?
2. **Value Proposition**: What does this company/product do? What problem does it solve?
3. **Product Focus**: What are the main products or services being offered?
4. **Marketing Copy**: The main headline, tagline, and key marketing messages (keep it concise).
5. **Pricing Strategy**: What pricing model are they likely using? (subscription, one-time purchase, freemium, etc.) Even if not visible, infer from the business model.
6. **Distribution Channels**: How are they reaching customers? (direct website, marketplaces, retail, etc.)
7. **Revenue Projection**: Based on the business model, market, and positioning, estimate:
   - Likely pricing range (even if not shown on site)
   - Estimated monthly revenue range
   - Key revenue drivers

Website Content:
{content}

Return your analysis in JSON format with keys: {keys}",
        content = truncate_chars(content, MAX_PROMPT_CONTENT_CHARS),
        keys = FIRST_QUARTER_KEYS,
    )
}

/// Prompt for every later quarter: focus on what moved since earlier snapshots.
pub fn later_quarter(content: &str, date: &str, quarter: &QuarterKey) -> String {
    format!(
        "Analyze this website snapshot from {date} ({quarter}) and extract:

1. **Marketing Copy**: Main headline, tagline, and key marketing messages (concise).
2. **Value Proposition**: What does this company/product do?
3. **Product Focus**: Main products or features being promoted.
4. **Pricing Strategy**: What pricing model or tiers are mentioned/implied?
5. **Changes**: What seems different from earlier versions? (positioning, messaging, product focus)
6. **Revenue Projection**: Estimate monthly revenue range based on business maturity and positioning at this stage.

Website Content:
{content}

Return your analysis in JSON format with keys: {keys}",
        content = truncate_chars(content, MAX_PROMPT_CONTENT_CHARS),
        keys = LATER_QUARTER_KEYS,
    )
}

pub fn build(content: &str, date: &str, quarter: &QuarterKey, is_first: bool) -> String {
    if is_first {
        first_quarter(content, date, quarter)
    } else {
        later_quarter(content, date, quarter)
    }
}
