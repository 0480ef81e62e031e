//! Declarative mapping from the feed's flat keys to internal field names.
//!
//! The feed mixes hyphens and underscores in its keys and is not always
//! consistent between fields of the same family, so every lookup goes through
//! these tables. A field spec may list several keys; the first one present and
//! convertible wins.

use serde_json::{Map, Number, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Int,
    Decimal,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldDefault {
    Null,
    Int(i64),
    Text(&'static str),
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub keys: &'static [&'static str],
    pub field: &'static str,
    pub kind: FieldKind,
    pub default: FieldDefault,
}

const fn spec(
    keys: &'static [&'static str],
    field: &'static str,
    kind: FieldKind,
    default: FieldDefault,
) -> FieldSpec {
    FieldSpec {
        keys,
        field,
        kind,
        default,
    }
}

const fn int(keys: &'static [&'static str], field: &'static str) -> FieldSpec {
    spec(keys, field, FieldKind::Int, FieldDefault::Null)
}

const fn dec(keys: &'static [&'static str], field: &'static str) -> FieldSpec {
    spec(keys, field, FieldKind::Decimal, FieldDefault::Null)
}

const fn text(keys: &'static [&'static str], field: &'static str) -> FieldSpec {
    spec(keys, field, FieldKind::Text, FieldDefault::Null)
}

pub const LEAGUE: &str = "league";
pub const HOME_TEAM: &str = "home_team";
pub const AWAY_TEAM: &str = "away_team";
pub const SCORE_HOME: &str = "score_home";
pub const SCORE_AWAY: &str = "score_away";
pub const SCORE_TOTAL: &str = "score_total";

/// Static pre-match fields, written once when the match is first seen.
pub const ENTITY_FIELDS: &[FieldSpec] = &[
    spec(&["liga"], LEAGUE, FieldKind::Text, FieldDefault::Text("Unknown")),
    spec(&["time-casa"], HOME_TEAM, FieldKind::Text, FieldDefault::Text("Home")),
    spec(&["time-visitante"], AWAY_TEAM, FieldKind::Text, FieldDefault::Text("Away")),
    text(&["link-betfair"], "link_betfair"),
    text(&["link-superbet"], "link_superbet"),
    text(&["link-bet365"], "link_bet365"),
    int(&["placar_ht-casa"], "ht_score_home"),
    int(&["placar_ht-visitante"], "ht_score_away"),
    int(&["placar_ht-total"], "ht_score_total"),
    dec(&["h2h-casa"], "h2h_home"),
    dec(&["h2h-visitante"], "h2h_away"),
    dec(&["h2h-total"], "h2h_total"),
    int(&["classificacao-casa"], "standing_home"),
    int(&["classificacao-visitante"], "standing_away"),
    int(&["classificacao-total"], "standing_total"),
    dec(&["ppj-casa"], "points_per_game_home"),
    dec(&["ppj-visitante"], "points_per_game_away"),
    dec(&["ppj-total"], "points_per_game_total"),
    dec(&["vitoria-casa"], "win_pct_home"),
    dec(&["vitoria-visitante"], "win_pct_away"),
    dec(&["vitoria-total"], "win_pct_total"),
    dec(&["derrota-casa"], "loss_pct_home"),
    dec(&["derrota-visitante"], "loss_pct_away"),
    dec(&["derrota-total"], "loss_pct_total"),
    dec(&["media_gols_marcados-casa"], "avg_goals_scored_home"),
    dec(&["media_gols_marcados-visitante"], "avg_goals_scored_away"),
    dec(&["media_gols_marcados-total"], "avg_goals_scored_total"),
    dec(&["media_gols_marcados_ht-casa"], "avg_goals_scored_ht_home"),
    dec(&["media_gols_marcados_ht-visitante"], "avg_goals_scored_ht_away"),
    dec(&["media_gols_marcados_ht-total"], "avg_goals_scored_ht_total"),
    dec(&["media_gols_sofridos-casa"], "avg_goals_conceded_home"),
    dec(&["media_gols_sofridos-visitante"], "avg_goals_conceded_away"),
    dec(&["media_gols_sofridos-total"], "avg_goals_conceded_total"),
    dec(&["medias_gols_sofridos_ht-casa"], "avg_goals_conceded_ht_home"),
    dec(&["medias_gols_sofridos_ht-visitante"], "avg_goals_conceded_ht_away"),
    dec(&["medias_gols_sofridos_ht-total"], "avg_goals_conceded_ht_total"),
    dec(&["xg_pre-casa"], "xg_pre_home"),
    dec(&["xg_pre-visitante"], "xg_pre_away"),
    dec(&["xg_pre-total"], "xg_pre_total"),
    dec(&["xga_pre-casa"], "xga_pre_home"),
    dec(&["xga_pre-visitante"], "xga_pre_away"),
    dec(&["xga_pre-total"], "xga_pre_total"),
    dec(&["clean_sheet-casa"], "clean_sheet_pct_home"),
    dec(&["clean_sheet-visitante"], "clean_sheet_pct_away"),
    dec(&["clean_sheet-total"], "clean_sheet_pct_total"),
    dec(&["btts-casa"], "btts_pct_home"),
    dec(&["btts-visitante"], "btts_pct_away"),
    dec(&["btts-total"], "btts_pct_total"),
    dec(&["over_0_5_ht-casa"], "over_05_ht_pct_home"),
    dec(&["over_0_5_ht-visitante"], "over_05_ht_pct_away"),
    dec(&["over_0_5_ht-total"], "over_05_ht_pct_total"),
    dec(&["over_1_5-casa"], "over_15_pct_home"),
    dec(&["over_1_5-visitante"], "over_15_pct_away"),
    dec(&["over_1_5-total"], "over_15_pct_total"),
    dec(&["over_2_5-casa"], "over_25_pct_home"),
    dec(&["over_2_5-visitante"], "over_25_pct_away"),
    dec(&["over_2_5-total"], "over_25_pct_total"),
    dec(&["over_0_5_marcados-casa"], "over_05_scored_pct_home"),
    dec(&["over_0_5_marcados-visitante"], "over_05_scored_pct_away"),
    dec(&["over_0_5_marcados-total"], "over_05_scored_pct_total"),
    dec(&["over_0_5_sofridos-casa"], "over_05_conceded_pct_home"),
    dec(&["over_0_5_sofridos-visitante"], "over_05_conceded_pct_away"),
    dec(&["over_0_5_sofridos-total"], "over_05_conceded_pct_total"),
    dec(&["media_gols-casa"], "avg_goals_home"),
    dec(&["media_gols-visitante"], "avg_goals_away"),
    dec(&["media_gols-total"], "avg_goals_total"),
    dec(&["media_gols_ht-casa"], "avg_goals_ht_home"),
    dec(&["media_gols_ht-visitante"], "avg_goals_ht_away"),
    dec(&["media_gols_ht-total"], "avg_goals_ht_total"),
    dec(&["gol_75-casa"], "goal_after_75_pct_home"),
    dec(&["gol_75-visitante"], "goal_after_75_pct_away"),
    dec(&["gol_75-total"], "goal_after_75_pct_total"),
    dec(&["odds_casa-pre"], "odds_home_pre"),
    dec(&["odds_visitante-pre"], "odds_away_pre"),
    dec(&["odds_empate-pre"], "odds_draw_pre"),
    dec(&["odds_btts_sim-pre"], "odds_btts_yes_pre"),
    dec(&["odds_over_0_5-pre"], "odds_over_05_pre"),
    dec(&["odds_over_1_5-pre"], "odds_over_15_pre"),
    dec(&["odds_over_2_5-pre"], "odds_over_25_pre"),
    dec(&["odds_over_3_5-pre"], "odds_over_35_pre"),
    dec(&["odds_over_0_5_ht-pre"], "odds_over_05_ht_pre"),
];

/// Live metrics, written with every persisted snapshot.
pub const SNAPSHOT_FIELDS: &[FieldSpec] = &[
    spec(&["placar-casa"], SCORE_HOME, FieldKind::Int, FieldDefault::Int(0)),
    spec(&["placar-visitante"], SCORE_AWAY, FieldKind::Int, FieldDefault::Int(0)),
    spec(&["placar-total"], SCORE_TOTAL, FieldKind::Int, FieldDefault::Int(0)),
    dec(&["xg-casa"], "xg_home"),
    dec(&["xg-visitante"], "xg_away"),
    dec(&["xg-total"], "xg_total"),
    dec(&["pi1-casa"], "pi1_home"),
    dec(&["pi1-visitante"], "pi1_away"),
    dec(&["pi1-total"], "pi1_total"),
    dec(&["pi2-casa"], "pi2_home"),
    dec(&["pi2-visitante"], "pi2_away"),
    dec(&["pi2-total"], "pi2_total"),
    dec(&["pi3-casa"], "pi3_home"),
    dec(&["pi3-visitante"], "pi3_away"),
    dec(&["pi3-total"], "pi3_total"),
    dec(&["appm-casa"], "appm_home"),
    dec(&["appm-visitante"], "appm_away"),
    dec(&["appm-total"], "appm_total"),
    dec(&["appm10-casa"], "appm10_home"),
    dec(&["appm10-visitante"], "appm10_away"),
    dec(&["appm10-total"], "appm10_total"),
    dec(&["cg-casa"], "cg_home"),
    dec(&["cg-visitante"], "cg_away"),
    dec(&["cg-total"], "cg_total"),
    dec(&["cg10-casa"], "cg10_home"),
    dec(&["cg10-visitante"], "cg10_away"),
    dec(&["cg10-total"], "cg10_total"),
    int(&["total_de_chutes-casa"], "shots_home"),
    int(&["total_de_chutes-visitante"], "shots_away"),
    int(&["total_de_chutes-total"], "shots_total"),
    int(&["chutes_ao_gol-casa"], "shots_on_target_home"),
    int(&["chutes_ao_gol-visitante"], "shots_on_target_away"),
    int(&["chutes_ao_gol-total"], "shots_on_target_total"),
    int(&["chutes_fora_do_gol-casa"], "shots_off_target_home"),
    int(&["chutes_fora_do_gol-visitante"], "shots_off_target_away"),
    int(&["chutes_fora_do_gol-total"], "shots_off_target_total"),
    int(&["cantos_ht-casa"], "corners_ht_home"),
    int(&["cantos_ht-visitante"], "corners_ht_away"),
    int(&["cantos_ht-total"], "corners_ht_total"),
    int(&["cantos-casa"], "corners_home"),
    int(&["cantos-visitante"], "corners_away"),
    int(&["cantos-total"], "corners_total"),
    int(&["ataques-casa"], "attacks_home"),
    int(&["ataques-visitante"], "attacks_away"),
    int(&["ataques-total"], "attacks_total"),
    int(&["ataques_perigosos-casa"], "dangerous_attacks_home"),
    int(&["ataques_perigosos-visitante"], "dangerous_attacks_away"),
    int(&["ataques_perigosos-total"], "dangerous_attacks_total"),
    dec(&["posse_de_bola-casa"], "possession_home"),
    dec(&["posse_de_bola-visitante"], "possession_away"),
    dec(&["posse_de_bola-total"], "possession_total"),
    int(&["cartoes_amarelos-casa"], "yellow_cards_home"),
    int(&["cartoes_amarelos-visitante"], "yellow_cards_away"),
    int(&["cartoes_amarelos-total"], "yellow_cards_total"),
    int(&["cartoes_vermelhos-casa"], "red_cards_home"),
    int(&["cartoes_vermelhos-visitante"], "red_cards_away"),
    int(&["cartoes_vermelhos-total"], "red_cards_total"),
    int(&["ultimo_gol-casa"], "last_goal_minute_home"),
    int(&["ultimo_gol-visitante"], "last_goal_minute_away"),
    int(&["ultimo_gol-total"], "last_goal_minute_total"),
    int(&["tempo_desde_o_ultimo_gol-casa"], "minutes_since_last_goal_home"),
    int(&["tempo_desde_o_ultimo_gol-visitante"], "minutes_since_last_goal_away"),
    int(&["tempo_desde_o_ultimo_gol-total"], "minutes_since_last_goal_total"),
    dec(&["odds_casa-live"], "odds_home_live"),
    dec(&["odds_visitante-live"], "odds_away_live"),
    dec(&["odds_empate-live"], "odds_draw_live"),
    dec(&["odds_btts_sim-live"], "odds_btts_yes_live"),
    dec(&["odds_over_0_5-live"], "odds_over_05_live"),
    dec(&["odds_over_1_5-live"], "odds_over_15_live"),
    // the feed spells this one with an underscore
    dec(&["odds_over_2_5_live", "odds_over_2_5-live"], "odds_over_25_live"),
    dec(&["odds_over_3_5-live"], "odds_over_35_live"),
    dec(&["odds_over_0_5_ht-live"], "odds_over_05_ht_live"),
    dec(&["cg_gol_marcados-casa"], "cg_goals_scored_home"),
    dec(&["cg_gol_marcados-visitante"], "cg_goals_scored_away"),
    dec(&["cg_gol_marcados-total"], "cg_goals_scored_total"),
    dec(&["1_gol-casa"], "first_goal_pct_home"),
    dec(&["1_gol-visitante"], "first_goal_pct_away"),
    dec(&["1_gol-total"], "first_goal_pct_total"),
];

/// Applies `specs` to a flat record. Every spec yields exactly one entry.
pub fn map_fields(specs: &[FieldSpec], record: &Map<String, Value>) -> Map<String, Value> {
    specs
        .iter()
        .map(|spec| (spec.field.to_string(), extract(spec, record)))
        .collect()
}

fn extract(spec: &FieldSpec, record: &Map<String, Value>) -> Value {
    spec.keys
        .iter()
        .filter_map(|key| record.get(*key))
        .find_map(|raw| coerce(spec.kind, raw))
        .unwrap_or_else(|| default_value(spec.default))
}

fn default_value(default: FieldDefault) -> Value {
    match default {
        FieldDefault::Null => Value::Null,
        FieldDefault::Int(v) => Value::from(v),
        FieldDefault::Text(v) => Value::from(v),
    }
}

fn coerce(kind: FieldKind, raw: &Value) -> Option<Value> {
    match kind {
        FieldKind::Int => as_f64(raw)
            .filter(|v| v.is_finite())
            .map(|v| Value::from(v.trunc() as i64)),
        FieldKind::Decimal => as_f64(raw).and_then(Number::from_f64).map(Value::Number),
        FieldKind::Text => match raw {
            Value::String(s) if !s.trim().is_empty() => Some(Value::String(s.clone())),
            Value::Number(n) => Some(Value::String(n.to_string())),
            _ => None,
        },
    }
}

pub(crate) fn as_f64(raw: &Value) -> Option<f64> {
    match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
