use std::path::PathBuf;

use chrono::NaiveDate;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};

use crate::error::ValidationError;
use crate::itinerary::{EmptyDayPolicy, ItineraryRequest};
use crate::models::{
    Experience, NewExperience, NewProfile, Profile, ProfileUpdate, Role, Sustainability,
    CATEGORIES,
};

const DATE_FORMAT: &str = "%Y-%m-%d";
const SIGN_UP_ROLES: &[&str] = &["tourist", "host"];
const ADMIN_ROLES: &[&str] = &["tourist", "host", "admin"];
const CATEGORY_CHOICES: &[&str] = &CATEGORIES;

/// What kind of input a field accepts. Toggles and choices are changed with
/// Space or the arrow keys instead of typing.
#[derive(Copy, Clone, PartialEq, Eq)]
pub(crate) enum FieldKind {
    Text,
    Digits,
    Decimal,
    Date,
    Toggle,
    Choice(&'static [&'static str]),
}

#[derive(Clone)]
pub(crate) struct Field {
    pub(crate) key: &'static str,
    pub(crate) label: &'static str,
    pub(crate) kind: FieldKind,
    pub(crate) value: String,
    pub(crate) checked: bool,
    pub(crate) choice: usize,
    pub(crate) required: bool,
}

impl Field {
    fn text(key: &'static str, label: &'static str, required: bool) -> Self {
        Self {
            key,
            label,
            kind: FieldKind::Text,
            value: String::new(),
            checked: false,
            choice: 0,
            required,
        }
    }

    fn of_kind(key: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self {
            kind,
            required: !matches!(kind, FieldKind::Toggle | FieldKind::Choice(_)),
            ..Self::text(key, label, true)
        }
    }

    fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    fn accepts(&self, ch: char) -> bool {
        match self.kind {
            FieldKind::Text => !ch.is_control(),
            FieldKind::Digits => ch.is_ascii_digit(),
            FieldKind::Decimal => ch.is_ascii_digit() || (ch == '.' && !self.value.contains('.')),
            FieldKind::Date => ch.is_ascii_digit() || ch == '-',
            FieldKind::Toggle | FieldKind::Choice(_) => false,
        }
    }

    fn is_typed(&self) -> bool {
        !matches!(self.kind, FieldKind::Toggle | FieldKind::Choice(_))
    }

    fn display(&self) -> String {
        match self.kind {
            FieldKind::Toggle => if self.checked { "[x]" } else { "[ ]" }.to_string(),
            FieldKind::Choice(options) => {
                format!("< {} >", options.get(self.choice).copied().unwrap_or(""))
            }
            _ if self.value.is_empty() && self.required => "<required>".to_string(),
            _ if self.value.is_empty() => "<optional>".to_string(),
            _ => self.value.clone(),
        }
    }
}

/// A modal form: an ordered list of fields, the focused one, and the last
/// validation failure so it can be shown next to its field.
#[derive(Clone)]
pub(crate) struct Form {
    pub(crate) fields: Vec<Field>,
    pub(crate) active: usize,
    pub(crate) error: Option<ValidationError>,
}

impl Form {
    fn new(fields: Vec<Field>) -> Self {
        Self {
            fields,
            active: 0,
            error: None,
        }
    }

    pub(crate) fn sign_in() -> Self {
        Self::new(vec![Field::text("email", "Email", true)])
    }

    /// Registration form. The admin role is offered only when an admin is
    /// creating the account.
    pub(crate) fn sign_up(allow_admin: bool) -> Self {
        let roles = if allow_admin { ADMIN_ROLES } else { SIGN_UP_ROLES };
        Self::new(vec![
            Field::text("full_name", "Full name", true),
            Field::text("email", "Email", true),
            Field::text("phone", "Phone", false),
            Field::text("location", "Location", false),
            Field::of_kind("role", "Role", FieldKind::Choice(roles)),
            Field::of_kind("is_local", "Local resident", FieldKind::Toggle),
        ])
    }

    pub(crate) fn profile(profile: &Profile) -> Self {
        let optional = |value: &Option<String>| value.clone().unwrap_or_default();
        Self::new(vec![
            Field::text("full_name", "Full name", true).with_value(profile.full_name.clone()),
            Field::text("phone", "Phone", false).with_value(optional(&profile.phone)),
            Field::text("location", "Location", false).with_value(optional(&profile.location)),
            Field::text("bio", "Bio", false).with_value(optional(&profile.bio)),
            Field::text("avatar", "Avatar file", false),
        ])
    }

    pub(crate) fn experience(today: NaiveDate) -> Self {
        Self::new(vec![
            Field::text("title", "Title", true),
            Field::text("description", "Description", true),
            Field::text("location", "Location", true),
            Field::of_kind("category", "Category", FieldKind::Choice(CATEGORY_CHOICES)),
            Field::of_kind("price", "Price per person", FieldKind::Decimal),
            Field::of_kind("duration", "Duration (hours)", FieldKind::Decimal),
            Field::of_kind("date", "Date", FieldKind::Date)
                .with_value(today.format(DATE_FORMAT).to_string()),
            Field::of_kind("max_participants", "Max participants", FieldKind::Digits),
            Field::of_kind("rating", "Sustainability rating", FieldKind::Decimal).with_value("0"),
            Field::of_kind("carbon", "Carbon estimate (kg)", FieldKind::Decimal).with_value("0"),
            Field::of_kind("local_spend", "Local spend", FieldKind::Decimal).with_value("0"),
            Field::of_kind("is_cultural", "Cultural", FieldKind::Toggle),
            Field::of_kind("is_certified", "Certified sustainable", FieldKind::Toggle),
            Field::text("images", "Images (comma separated)", false),
        ])
    }

    pub(crate) fn booking(experience: &Experience) -> Self {
        let default = experience.remaining_capacity().min(1);
        Self::new(vec![
            Field::of_kind("participants", "Participants", FieldKind::Digits)
                .with_value(default.to_string()),
        ])
    }

    pub(crate) fn itinerary(today: NaiveDate) -> Self {
        let end = today.succ_opt().unwrap_or(today);
        let mut fields = vec![
            Field::of_kind("start_date", "Start date", FieldKind::Date)
                .with_value(today.format(DATE_FORMAT).to_string()),
            Field::of_kind("end_date", "End date", FieldKind::Date)
                .with_value(end.format(DATE_FORMAT).to_string()),
            Field::of_kind("budget", "Budget", FieldKind::Decimal),
            Field::of_kind("group_size", "Group size", FieldKind::Digits).with_value("1"),
        ];
        fields.extend(
            CATEGORIES
                .into_iter()
                .map(|category| Field::of_kind(category, category, FieldKind::Toggle)),
        );
        fields.push(Field::of_kind("skip_empty", "Skip days that don't fit", FieldKind::Toggle));
        Self::new(fields)
    }

    fn current(&mut self) -> Option<&mut Field> {
        self.fields.get_mut(self.active)
    }

    pub(crate) fn next_field(&mut self) {
        if !self.fields.is_empty() {
            self.active = (self.active + 1) % self.fields.len();
        }
    }

    pub(crate) fn previous_field(&mut self) {
        if !self.fields.is_empty() {
            self.active = (self.active + self.fields.len() - 1) % self.fields.len();
        }
    }

    /// Type into the focused field, or flip it when it is a toggle/choice and
    /// the key is a space. Returns whether anything changed.
    pub(crate) fn push_char(&mut self, ch: char) -> bool {
        let Some(field) = self.current() else {
            return false;
        };
        if field.is_typed() {
            let accepted = field.accepts(ch);
            if accepted {
                field.value.push(ch);
            }
            return accepted;
        }
        if ch == ' ' {
            self.cycle(1);
            return true;
        }
        false
    }

    pub(crate) fn backspace(&mut self) {
        if let Some(field) = self.current() {
            field.value.pop();
        }
    }

    /// Step a choice field forward or back; toggles flip either way.
    pub(crate) fn cycle(&mut self, offset: isize) {
        let Some(field) = self.current() else {
            return;
        };
        match field.kind {
            FieldKind::Toggle => field.checked = !field.checked,
            FieldKind::Choice(options) if !options.is_empty() => {
                let len = options.len() as isize;
                field.choice = (field.choice as isize + offset).rem_euclid(len) as usize;
            }
            _ => {}
        }
    }

    /// Record a failure and move focus to the field it belongs to.
    pub(crate) fn fail(&mut self, error: ValidationError) {
        if let Some(idx) = self.fields.iter().position(|f| f.key == error.field) {
            self.active = idx;
        }
        self.error = Some(error);
    }

    fn field(&self, key: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.key == key)
    }

    fn text(&self, key: &str) -> &str {
        self.field(key).map(|f| f.value.trim()).unwrap_or("")
    }

    fn optional(&self, key: &str) -> Option<String> {
        let value = self.text(key);
        (!value.is_empty()).then(|| value.to_string())
    }

    fn checked(&self, key: &str) -> bool {
        self.field(key).is_some_and(|f| f.checked)
    }

    fn choice(&self, key: &str) -> &'static str {
        match self.field(key) {
            Some(Field {
                kind: FieldKind::Choice(options),
                choice,
                ..
            }) => options.get(*choice).copied().unwrap_or(""),
            _ => "",
        }
    }

    fn decimal(&self, key: &'static str, label: &str) -> Result<f64, ValidationError> {
        let raw = self.text(key);
        if raw.is_empty() {
            return Err(ValidationError::new(key, format!("{label} is required.")));
        }
        raw.parse::<f64>()
            .map_err(|_| ValidationError::new(key, format!("{label} must be a number.")))
    }

    fn count(&self, key: &'static str, label: &str) -> Result<u32, ValidationError> {
        let raw = self.text(key);
        if raw.is_empty() {
            return Err(ValidationError::new(key, format!("{label} is required.")));
        }
        raw.parse::<u32>()
            .map_err(|_| ValidationError::new(key, format!("{label} must be a whole number.")))
    }

    fn date(&self, key: &'static str, label: &str) -> Result<NaiveDate, ValidationError> {
        NaiveDate::parse_from_str(self.text(key), DATE_FORMAT)
            .map_err(|_| ValidationError::new(key, format!("{label} must look like 2024-01-31.")))
    }

    pub(crate) fn email(&self) -> Result<String, ValidationError> {
        let email = self.text("email");
        if email.is_empty() {
            return Err(ValidationError::new("email", "Email is required."));
        }
        Ok(email.to_string())
    }

    pub(crate) fn new_profile(&self) -> Result<NewProfile, ValidationError> {
        let role = self
            .choice("role")
            .parse::<Role>()
            .map_err(|err| ValidationError::new("role", err.to_string()))?;
        Ok(NewProfile {
            full_name: self.text("full_name").to_string(),
            email: self.text("email").to_string(),
            role,
            phone: self.optional("phone"),
            location: self.optional("location"),
            is_local: self.checked("is_local"),
        })
    }

    /// Profile edits plus the avatar file to upload, if one was named.
    pub(crate) fn profile_update(&self) -> (ProfileUpdate, Option<PathBuf>) {
        let update = ProfileUpdate {
            full_name: self.text("full_name").to_string(),
            phone: self.optional("phone"),
            location: self.optional("location"),
            bio: self.optional("bio"),
            avatar_url: None,
        };
        (update, self.optional("avatar").map(PathBuf::from))
    }

    pub(crate) fn new_experience(&self) -> Result<(NewExperience, Vec<PathBuf>), ValidationError> {
        let draft = NewExperience {
            title: self.text("title").to_string(),
            description: self.text("description").to_string(),
            location: self.text("location").to_string(),
            category: self.choice("category").to_string(),
            price: self.decimal("price", "Price")?,
            duration_hours: self.decimal("duration", "Duration")?,
            date: self.date("date", "Date")?,
            max_participants: self.count("max_participants", "Max participants")?,
            sustainability: Sustainability {
                rating: self.decimal("rating", "Rating")?,
                is_cultural: self.checked("is_cultural"),
                is_certified_sustainable: self.checked("is_certified"),
                carbon_estimate: self.decimal("carbon", "Carbon estimate")?,
                local_spend: self.decimal("local_spend", "Local spend")?,
            },
        };
        let images = self
            .text("images")
            .split(',')
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .map(PathBuf::from)
            .collect();
        Ok((draft, images))
    }

    pub(crate) fn participants(&self) -> Result<u32, ValidationError> {
        self.count("participants", "Participants")
    }

    pub(crate) fn itinerary_request(
        &self,
    ) -> Result<(ItineraryRequest, EmptyDayPolicy), ValidationError> {
        let request = ItineraryRequest {
            start: self.date("start_date", "Start date")?,
            end: self.date("end_date", "End date")?,
            budget: self.decimal("budget", "Budget")?,
            group_size: self.count("group_size", "Group size")?,
            categories: CATEGORIES
                .into_iter()
                .filter(|category| self.checked(category))
                .map(|category| category.to_string())
                .collect(),
        };
        let policy = if self.checked("skip_empty") {
            EmptyDayPolicy::Skip
        } else {
            EmptyDayPolicy::Stop
        };
        Ok((request, policy))
    }

    /// One line per field, the focused one highlighted and an error shown
    /// under the field it concerns.
    pub(crate) fn lines(&self) -> Vec<Line<'static>> {
        let mut lines = Vec::with_capacity(self.fields.len() + 2);
        for (idx, field) in self.fields.iter().enumerate() {
            let is_active = idx == self.active;
            let style = if is_active {
                Style::default().fg(Color::Yellow)
            } else if field.is_typed() && field.value.is_empty() {
                Style::default().fg(Color::DarkGray)
            } else {
                Style::default()
            };
            lines.push(Line::from(vec![
                Span::raw(format!("{}: ", field.label)),
                Span::styled(field.display(), style),
            ]));
            if let Some(error) = self.error.as_ref().filter(|e| e.field == field.key) {
                lines.push(Line::from(Span::styled(
                    format!("  {}", error.message),
                    Style::default().fg(Color::Red),
                )));
            }
        }

        lines.push(Line::from(""));
        match &self.error {
            Some(error) if self.field(error.field).is_none() => lines.push(Line::from(
                Span::styled(error.message.clone(), Style::default().fg(Color::Red)),
            )),
            _ => lines.push(Line::from(Span::styled(
                "Enter to submit • Tab to switch • Space to toggle • Esc to cancel",
                Style::default()
                    .fg(Color::Gray)
                    .add_modifier(Modifier::ITALIC),
            ))),
        }
        lines
    }

    /// Column and row of the text cursor inside the form body, if the focused
    /// field takes typed input.
    pub(crate) fn cursor(&self) -> Option<(u16, u16)> {
        let field = self.fields.get(self.active)?;
        if !field.is_typed() {
            return None;
        }
        let error_rows = self
            .error
            .as_ref()
            .and_then(|e| self.fields.iter().position(|f| f.key == e.field))
            .filter(|idx| *idx < self.active)
            .map_or(0, |_| 1);
        let x = field.label.chars().count() + 2 + field.value.chars().count();
        Some((x as u16, (self.active + error_rows) as u16))
    }
}

/// State for an active inline search.
#[derive(Clone, Default)]
pub(crate) struct SearchState {
    pub(crate) query: String,
}

/// A yes/no prompt guarding a destructive action.
pub(crate) struct Confirm {
    pub(crate) prompt: String,
    pub(crate) action: ConfirmAction,
}

#[derive(Clone, Copy)]
pub(crate) enum ConfirmAction {
    CancelBooking(i64),
    SignOut,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn type_str(form: &mut Form, text: &str) {
        for ch in text.chars() {
            form.push_char(ch);
        }
    }

    #[test]
    fn typed_fields_filter_characters() {
        let mut form = Form::itinerary(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        form.active = 2;
        type_str(&mut form, "12a.5.0");
        assert_eq!(form.fields[2].value, "12.50");

        form.next_field();
        form.backspace();
        type_str(&mut form, "x3");
        assert_eq!(form.fields[3].value, "3");
    }

    #[test]
    fn itinerary_form_builds_a_request() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let mut form = Form::itinerary(today);
        form.active = 2;
        type_str(&mut form, "300");
        let food = form.fields.iter().position(|f| f.key == "food").unwrap();
        form.active = food;
        form.push_char(' ');

        let (request, policy) = form.itinerary_request().unwrap();
        assert_eq!(request.start, today);
        assert_eq!(request.trip_days(), 1);
        assert_eq!(request.budget, 300.0);
        assert_eq!(request.categories, vec!["food".to_string()]);
        assert_eq!(policy, EmptyDayPolicy::Stop);
    }

    #[test]
    fn sign_up_role_choice_wraps() {
        let mut form = Form::sign_up(false);
        form.active = 4;
        assert_eq!(form.new_profile().unwrap().role, Role::Tourist);
        form.cycle(1);
        assert_eq!(form.new_profile().unwrap().role, Role::Host);
        form.cycle(1);
        assert_eq!(form.new_profile().unwrap().role, Role::Tourist);
        form.cycle(-1);
        assert_eq!(form.new_profile().unwrap().role, Role::Host);
    }

    #[test]
    fn failures_focus_their_field() {
        let mut form = Form::experience(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        let err = form.new_experience().unwrap_err();
        assert_eq!(err.field, "price");

        form.fail(err);
        assert_eq!(form.fields[form.active].key, "price");
        assert!(form
            .lines()
            .iter()
            .any(|line| line.to_string().contains("Price is required.")));
    }

    #[test]
    fn experience_images_split_on_commas() {
        let mut form = Form::experience(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        for (key, value) in [
            ("title", "Kolam class"),
            ("description", "Rice flour patterns"),
            ("location", "Chennai"),
            ("price", "15"),
            ("duration", "1.5"),
            ("max_participants", "6"),
            ("images", " a.jpg, ,b.png "),
        ] {
            let idx = form.fields.iter().position(|f| f.key == key).unwrap();
            form.fields[idx].value = value.to_string();
        }

        let (draft, images) = form.new_experience().unwrap();
        assert_eq!(draft.category, "food");
        assert_eq!(draft.max_participants, 6);
        assert_eq!(images, vec![PathBuf::from("a.jpg"), PathBuf::from("b.png")]);
    }
}
