//! GraphQL documents sent to the Sorare API

use serde_json::{Map, Value};

/// Rarities synchronized from the user's gallery
pub const GALLERY_RARITIES: [&str; 4] = ["limited", "rare", "super_rare", "unique"];

/// Cards fetched per gallery page
pub const GALLERY_PAGE_SIZE: u32 = 50;

/// Paginated list of a user's cards
pub const ALL_CARDS_QUERY: &str = r#"
query AllCardsFromUser($userSlug: String!, $rarities: [Rarity!], $cursor: String, $first: Int!) {
    user(slug: $userSlug) {
        cards(rarities: $rarities, after: $cursor, first: $first) {
            nodes {
                ... on Card {
                    slug
                    rarity
                    ownerSince
                    player { ... on Player { displayName slug position u23Eligible } }
                }
            }
            pageInfo { endCursor hasNextPage }
        }
    }
}
"#;

/// Selection returning the cheapest live offer
const PRICE_SELECTION: &str = "liveSingleSaleOffer { receiverSide { amounts { eurCents usdCents gbpCents wei referenceCurrency } } }";

/// Aliases of the six floor-price lookups and their arguments
pub const FLOOR_LOOKUPS: [(&str, &str, bool); 6] = [
    ("L_ANY", "limited", false),
    ("L_IN", "limited", true),
    ("R_ANY", "rare", false),
    ("R_IN", "rare", true),
    ("SR_ANY", "super_rare", false),
    ("SR_IN", "super_rare", true),
];

fn floor_selection() -> String {
    FLOOR_LOOKUPS
        .iter()
        .map(|(alias, rarity, in_season)| {
            format!(
                "{alias}: lowestPriceAnyCard(rarity: {rarity}, inSeason: {in_season}) {{ {PRICE_SELECTION} }}"
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Full details of one card, its player and the player's floor prices
pub fn card_details_query() -> String {
    format!(
        r#"
query GetCardDetails($cardSlug: String!) {{
    anyCard(slug: $cardSlug) {{
        ... on Card {{
            rarity grade xp xpNeededForNextGrade pictureUrl inSeasonEligible secondaryMarketFeeEnabled
            {PRICE_SELECTION}
            player {{
                slug displayName position lastFiveSo5Appearances lastFifteenSo5Appearances u23Eligible
                playerGameScores(last: 15) {{ score }}
                activeInjuries {{ status expectedEndDate }}
                activeSuspensions {{ reason endDate }}
                activeClub {{
                    name
                    upcomingGames(first: 1) {{
                        id date
                        competition {{ displayName }}
                        homeTeam {{ ... on TeamInterface {{ name }} }}
                        awayTeam {{ ... on TeamInterface {{ name }} }}
                    }}
                }}
                {floors}
            }}
        }}
    }}
}}
"#,
        floors = floor_selection()
    )
}

/// Projection and starter odds of a player for one game
pub const PROJECTION_QUERY: &str = r#"
query GetProjection($playerSlug: String!, $gameId: ID!) {
    football {
        player(slug: $playerSlug) {
            playerGameScore(gameId: $gameId) {
                projection { grade score reliabilityBasisPoints }
                anyPlayerGameStats {
                    ... on PlayerGameStats {
                        footballPlayingStatusOdds { starterOddsBasisPoints }
                    }
                }
            }
        }
    }
}
"#;

/// Recent sales of a player at one rarity
pub const TOKEN_PRICES_QUERY: &str = r#"
query GetPlayerTokenPrices($playerSlug: String!, $rarity: Rarity!, $limit: Int!) {
    tokens {
        tokenPrices(playerSlug: $playerSlug, rarity: $rarity, first: $limit, includePrivateSales: true) {
            amounts { eurCents }
            date
            card { inSeasonEligible }
        }
    }
}
"#;

/// Alias under which the `index`-th player of a floor batch is returned
pub fn floor_alias(index: usize) -> String {
    format!("p{index}")
}

/// Floor prices of several players in one request, with its variables
pub fn floor_batch_query(player_slugs: &[String]) -> (String, Value) {
    let declarations = (0..player_slugs.len())
        .map(|i| format!("$s{i}: String!"))
        .collect::<Vec<_>>()
        .join(", ");

    let floors = floor_selection();
    let selections = (0..player_slugs.len())
        .map(|i| format!("{}: player(slug: $s{i}) {{ slug\n{floors} }}", floor_alias(i)))
        .collect::<Vec<_>>()
        .join("\n");

    let query = format!("query FloorPrices({declarations}) {{ football {{ {selections} }} }}");

    let variables: Map<String, Value> = player_slugs
        .iter()
        .enumerate()
        .map(|(i, slug)| (format!("s{i}"), Value::String(slug.clone())))
        .collect();

    (query, Value::Object(variables))
}
