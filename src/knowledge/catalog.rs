//! Built-in action catalog for the campus assistant.
//!
//! Costs fold the expected latency of each backend into the base cost
//! (`base + 0.1 * seconds`), so slow integrations are planned only when needed.

use crate::state::{Condition, Effect};

use super::{ActionSchema, GoalTemplate, KnowledgeBase, KnowledgeResult, ParamKind};

/// Planning cost of an action with the given base cost and typical latency.
fn weighted(base: f64, seconds: f64) -> f64 {
    base + seconds * 0.1
}

/// An action with no preconditions that sets a single `<fact> = true`.
fn lookup(id: &str, fact: &str, base: f64, seconds: f64, description: &str) -> ActionSchema {
    ActionSchema::new(id)
        .describe(description)
        .cost(weighted(base, seconds))
        .effect(Effect::set(fact, true))
}

fn valid(param: &str) -> Condition {
    Condition::equals(format!("{param}_valid"), true)
}

/// Intent label -> fact that fulfils it.
const GOALS: &[(&str, &str)] = &[
    ("CheckWeather", "weather_known"),
    ("SendEmail", "email_sent"),
    ("BookHotel", "hotel_booked"),
    ("SetReminder", "reminder_set"),
    ("SearchFlights", "flights_found"),
    ("CreateCalendarEvent", "calendar_event_created"),
    ("PlanTrip", "trip_planned"),
    ("CheckAttendance", "attendance_known"),
    ("CheckSubjectAttendance", "subject_attendance_known"),
    ("CheckMonthlyAttendance", "monthly_attendance_known"),
    ("CheckTimetable", "timetable_known"),
    ("CheckSubjectSchedule", "subject_schedule_known"),
    ("CheckTimeSchedule", "time_schedule_known"),
    ("CheckCafeteriaMenu", "cafeteria_menu_known"),
    ("CheckBreakfastMenu", "breakfast_menu_known"),
    ("CheckLunchMenu", "lunch_menu_known"),
    ("CheckDinnerMenu", "dinner_menu_known"),
    ("CheckSnackMenu", "snack_menu_known"),
    ("SearchInternet", "internet_search_complete"),
    ("GenerateAttendancePDF", "attendance_pdf_sent"),
    ("GenerateTimetablePDF", "timetable_pdf_sent"),
    ("GenerateCafeteriaPDF", "cafeteria_pdf_sent"),
    ("Greeting", "greeting_responded"),
    ("SmallTalk", "smalltalk_responded"),
    ("Conversation", "conversation_responded"),
];

/// The built-in knowledge base.
///
/// Todo intents (`AddTodo`, `ListTodos`, `CompleteTodo`, `DeleteTodo`) have
/// actions but no goal template: they run directly without search.
pub fn builtin() -> KnowledgeResult<KnowledgeBase> {
    let mut builder = KnowledgeBase::builder();
    for action in actions() {
        builder = builder.action(action);
    }
    for (intent, fact) in GOALS {
        builder = builder.goal(GoalTemplate::new(*intent).require(Condition::equals(*fact, true)));
    }
    builder.build()
}

fn actions() -> Vec<ActionSchema> {
    vec![
        // ── Travel and productivity ──
        ActionSchema::new("CheckWeather")
            .describe("Check weather conditions for a location")
            .param("location", ParamKind::Text)
            .requires(valid("location"))
            .effect(Effect::set("weather_known", true))
            .effect(Effect::set_param("weather_location", "location"))
            .cost(weighted(1.0, 2.0)),
        ActionSchema::new("DraftEmail")
            .describe("Compose the email body")
            .optional_param("body", ParamKind::Text)
            .effect(Effect::set("email_content_ready", true))
            .produces("body")
            .cost(weighted(0.5, 1.0)),
        ActionSchema::new("SendEmail")
            .describe("Send an email to a recipient")
            .param("recipient", ParamKind::Text)
            .optional_param("subject", ParamKind::Text)
            .optional_param("body", ParamKind::Text)
            .optional_param("attachment", ParamKind::Any)
            .requires(valid("recipient"))
            .requires(Condition::equals("email_content_ready", true))
            .consumes("body")
            .consumes("attachment")
            .after("DraftEmail")
            .effect(Effect::set("email_sent", true))
            .cost(weighted(2.0, 3.0)),
        ActionSchema::new("BookHotel")
            .describe("Book a hotel room")
            .param("location", ParamKind::Text)
            .optional_param("check_in", ParamKind::Date)
            .optional_param("check_out", ParamKind::Date)
            .optional_param("guests", ParamKind::Integer)
            .requires(valid("location"))
            .requires(valid("dates"))
            .after("CheckWeather")
            .effect(Effect::set("hotel_booked", true))
            .cost(weighted(5.0, 10.0)),
        ActionSchema::new("SetReminder")
            .describe("Set a reminder or alarm")
            .param("datetime", ParamKind::Date)
            .optional_param("message", ParamKind::Text)
            .requires(valid("datetime"))
            .effect(Effect::set("reminder_set", true))
            .cost(weighted(1.0, 1.0)),
        ActionSchema::new("SearchFlights")
            .describe("Search for flight options")
            .param("origin", ParamKind::Text)
            .param("destination", ParamKind::Text)
            .param("date", ParamKind::Date)
            .requires(valid("origin"))
            .requires(valid("destination"))
            .requires(valid("date"))
            .effect(Effect::set("flights_found", true))
            .cost(weighted(3.0, 5.0)),
        ActionSchema::new("CreateCalendarEvent")
            .describe("Create a calendar event")
            .param("title", ParamKind::Text)
            .param("datetime", ParamKind::Date)
            .optional_param("duration", ParamKind::Integer)
            .requires(valid("datetime"))
            .requires(valid("title"))
            .effect(Effect::set("calendar_event_created", true))
            .cost(weighted(1.5, 2.0)),
        ActionSchema::new("PlanTrip")
            .describe("Plan a multi-step trip")
            .param("location", ParamKind::Text)
            .param("date", ParamKind::Date)
            .optional_param("duration", ParamKind::Integer)
            .requires(valid("location"))
            .requires(valid("date"))
            .after("CheckWeather")
            .after("SearchFlights")
            .after("BookHotel")
            .effect(Effect::set("trip_planned", true))
            .cost(weighted(8.0, 15.0)),
        // ── Campus records ──
        lookup(
            "CheckAttendance",
            "attendance_known",
            2.0,
            3.0,
            "Check overall student attendance records",
        )
        .produces("attendance"),
        lookup(
            "CheckSubjectAttendance",
            "subject_attendance_known",
            1.5,
            2.0,
            "Check attendance for a specific subject",
        )
        .optional_param("subject", ParamKind::Text),
        lookup(
            "CheckMonthlyAttendance",
            "monthly_attendance_known",
            1.5,
            2.0,
            "Check this month's attendance",
        ),
        lookup(
            "CheckTimetable",
            "timetable_known",
            2.0,
            3.0,
            "Check full class timetable or schedule",
        )
        .optional_param("date", ParamKind::Date)
        .produces("timetable"),
        lookup(
            "CheckSubjectSchedule",
            "subject_schedule_known",
            1.5,
            2.0,
            "Find when a specific subject is scheduled",
        )
        .optional_param("subject", ParamKind::Text),
        lookup(
            "CheckTimeSchedule",
            "time_schedule_known",
            1.5,
            2.0,
            "Find what subject is scheduled at a specific time",
        )
        .optional_param("time", ParamKind::Text),
        lookup(
            "CheckCafeteriaMenu",
            "cafeteria_menu_known",
            1.5,
            2.0,
            "Check full cafeteria or mess menu",
        )
        .produces("menu"),
        lookup("CheckBreakfastMenu", "breakfast_menu_known", 1.0, 2.0, "Check breakfast menu"),
        lookup("CheckLunchMenu", "lunch_menu_known", 1.0, 2.0, "Check lunch menu"),
        lookup("CheckDinnerMenu", "dinner_menu_known", 1.0, 2.0, "Check dinner menu"),
        lookup("CheckSnackMenu", "snack_menu_known", 1.0, 2.0, "Check snack menu"),
        ActionSchema::new("SearchInternet")
            .describe("Search the internet for information")
            .param("query", ParamKind::Text)
            .requires(valid("query"))
            .effect(Effect::set("internet_search_complete", true))
            .cost(weighted(3.0, 5.0)),
        // ── Reports ──
        lookup(
            "GenerateAttendancePDF",
            "attendance_pdf_sent",
            3.0,
            5.0,
            "Generate and send attendance PDF report",
        )
        .requires(Condition::equals("attendance_known", true))
        .consumes("attendance")
        .produces("attachment"),
        lookup(
            "GenerateTimetablePDF",
            "timetable_pdf_sent",
            3.0,
            5.0,
            "Generate and send timetable PDF report",
        )
        .optional_param("date", ParamKind::Date)
        .requires(Condition::equals("timetable_known", true))
        .consumes("timetable")
        .produces("attachment"),
        lookup(
            "GenerateCafeteriaPDF",
            "cafeteria_pdf_sent",
            3.0,
            5.0,
            "Generate and send cafeteria menu PDF report",
        )
        .requires(Condition::equals("cafeteria_menu_known", true))
        .consumes("menu")
        .produces("attachment"),
        // ── Conversation ──
        lookup("Greeting", "greeting_responded", 0.5, 1.0, "Respond to greetings naturally"),
        lookup("SmallTalk", "smalltalk_responded", 0.5, 1.0, "Engage in casual conversation"),
        lookup("Conversation", "conversation_responded", 1.0, 2.0, "Handle nuanced conversations"),
        // ── Todos (direct execution, no goal template) ──
        ActionSchema::new("AddTodo")
            .describe("Add a task to the todo list")
            .param("task", ParamKind::Text)
            .effect(Effect::set("todo_added", true)),
        ActionSchema::new("ListTodos")
            .describe("List pending or completed todos")
            .optional_param("show_completed", ParamKind::Boolean)
            .effect(Effect::set("todos_listed", true)),
        ActionSchema::new("CompleteTodo")
            .describe("Mark a todo as complete")
            .param("task", ParamKind::Text)
            .effect(Effect::set("todo_completed", true)),
        ActionSchema::new("DeleteTodo")
            .describe("Delete a todo")
            .param("task", ParamKind::Text)
            .effect(Effect::set("todo_deleted", true)),
    ]
}
