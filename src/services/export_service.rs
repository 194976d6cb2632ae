use crate::dto::teacher_dto::SubjectReport;
use crate::error::Result;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_xlsxwriter::*;

pub struct ExportService;

struct Palette {
    primary: Color,
    header_bg: Color,
    alt_row: Color,
    border: Color,
    high: Color,
    mid: Color,
    low: Color,
}

const PALETTE: Palette = Palette {
    primary: Color::RGB(0x1E293B),   // Slate 800
    header_bg: Color::RGB(0x0F172A), // Slate 900
    alt_row: Color::RGB(0xF8FAFC),   // Slate 50
    border: Color::RGB(0xE2E8F0),    // Slate 200
    high: Color::RGB(0x10B981),      // Emerald
    mid: Color::RGB(0xF59E0B),       // Amber
    low: Color::RGB(0xEF4444),       // Red
};

fn num(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

fn percentage_color(value: Decimal) -> Color {
    if value >= Decimal::from(85) {
        PALETTE.high
    } else if value >= Decimal::from(40) {
        PALETTE.mid
    } else {
        PALETTE.low
    }
}

impl ExportService {
    /// Sheet file name for a report, e.g. `report_algebra_q2_20261016.xlsx`.
    pub fn report_filename(report: &SubjectReport) -> String {
        let slug: String = report
            .title
            .chars()
            .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect();
        format!(
            "report_{}_q{}_{}.xlsx",
            slug.trim_matches('_'),
            report.selected_quarter,
            chrono::Utc::now().format("%Y%m%d")
        )
    }

    /// Styled workbook with the quarter assessments and per-student averages.
    pub fn generate_report_xlsx(report: &SubjectReport) -> Result<Vec<u8>> {
        let mut workbook = Workbook::new();

        let mut assessments = Worksheet::new();
        Self::write_assessments(&mut assessments, report)?;
        workbook.push_worksheet(assessments);

        let mut students = Worksheet::new();
        Self::write_students(&mut students, report)?;
        workbook.push_worksheet(students);

        let buffer = workbook.save_to_buffer()?;
        Ok(buffer)
    }

    fn write_heading(
        worksheet: &mut Worksheet,
        title: &str,
        subtitle: &str,
        columns: &[(&str, f64)],
    ) -> Result<()> {
        for (i, (_, width)) in columns.iter().enumerate() {
            worksheet.set_column_width(i as u16, *width)?;
        }
        let last_col = (columns.len() - 1) as u16;

        let title_format = Format::new()
            .set_font_size(16)
            .set_bold()
            .set_font_color(Color::White)
            .set_background_color(PALETTE.primary)
            .set_align(FormatAlign::CenterAcross)
            .set_align(FormatAlign::VerticalCenter);
        worksheet.set_row_height(0, 40)?;
        worksheet.merge_range(0, 0, 0, last_col, title, &title_format)?;

        let subtitle_format = Format::new()
            .set_font_size(10)
            .set_italic()
            .set_font_color(Color::RGB(0x94A3B8))
            .set_background_color(PALETTE.primary)
            .set_align(FormatAlign::CenterAcross)
            .set_align(FormatAlign::VerticalCenter);
        worksheet.set_row_height(1, 22)?;
        worksheet.merge_range(1, 0, 1, last_col, subtitle, &subtitle_format)?;

        let header_format = Format::new()
            .set_bold()
            .set_font_size(10)
            .set_font_color(Color::White)
            .set_background_color(PALETTE.header_bg)
            .set_align(FormatAlign::Center)
            .set_align(FormatAlign::VerticalCenter)
            .set_text_wrap()
            .set_border(FormatBorder::Thin)
            .set_border_color(PALETTE.border);
        worksheet.set_row_height(2, 30)?;
        for (i, (name, _)) in columns.iter().enumerate() {
            worksheet.write_string_with_format(2, i as u16, *name, &header_format)?;
        }
        Ok(())
    }

    fn base_format(idx: usize) -> Format {
        let bg = if idx % 2 == 0 { PALETTE.alt_row } else { Color::White };
        Format::new()
            .set_font_size(10)
            .set_background_color(bg)
            .set_align(FormatAlign::VerticalCenter)
            .set_border(FormatBorder::Thin)
            .set_border_color(PALETTE.border)
    }

    fn subtitle(report: &SubjectReport) -> String {
        let now = chrono::Utc::now().format("%d.%m.%Y %H:%M UTC").to_string();
        format!(
            "Дата экспорта: {}  •  Четверть: {}  •  Класс: {}",
            now,
            report.selected_quarter,
            report.selected_class.as_deref().unwrap_or("все")
        )
    }

    fn write_assessments(worksheet: &mut Worksheet, report: &SubjectReport) -> Result<()> {
        worksheet.set_name("Оценивания")?;
        let columns = [
            ("№", 8.0),
            ("Урок", 40.0),
            ("Тип", 12.0),
            ("Учеников", 12.0),
            ("Макс. балл", 12.0),
            ("Ниже 40%", 12.0),
            ("40–85%", 12.0),
            ("85% и выше", 12.0),
        ];
        let title = format!("{}: СОР и СОЧ", report.title);
        Self::write_heading(worksheet, &title, &Self::subtitle(report), &columns)?;

        let data_start_row = 3;
        for (idx, item) in report.assessments.iter().enumerate() {
            let row = data_start_row + idx as u32;
            let base_fmt = Self::base_format(idx);
            let center_fmt = base_fmt.clone().set_align(FormatAlign::Center);
            worksheet.set_row_height(row, 22)?;

            let kind = match item.lesson_type.as_str() {
                "chapter" => "СОР",
                "quarter" => "СОЧ",
                other => other,
            };

            worksheet.write_number_with_format(row, 0, (idx + 1) as f64, &center_fmt)?;
            worksheet.write_string_with_format(row, 1, &item.title, &base_fmt.clone().set_bold())?;
            worksheet.write_string_with_format(row, 2, kind, &center_fmt)?;
            worksheet.write_number_with_format(row, 3, item.students as f64, &center_fmt)?;
            worksheet.write_number_with_format(row, 4, item.max_score as f64, &center_fmt)?;

            let bands = [
                (item.bands.low, PALETTE.low),
                (item.bands.mid, PALETTE.mid),
                (item.bands.high, PALETTE.high),
            ];
            for (offset, (count, color)) in bands.iter().enumerate() {
                let band_fmt = center_fmt.clone().set_bold().set_font_color(*color);
                worksheet.write_number_with_format(row, 5 + offset as u16, *count as f64, &band_fmt)?;
            }
        }

        let stats = &report.statistics;
        let summary_row = data_start_row + report.assessments.len() as u32 + 1;
        let summary_fmt = Format::new()
            .set_bold()
            .set_font_size(10)
            .set_font_color(PALETTE.primary)
            .set_background_color(Color::RGB(0xE0E7FF)) // Indigo 100
            .set_align(FormatAlign::Center)
            .set_align(FormatAlign::VerticalCenter)
            .set_border(FormatBorder::Thin)
            .set_border_color(PALETTE.border);
        worksheet.set_row_height(summary_row, 26)?;
        let summary = format!(
            "Разделы пройдены всеми: {}/{} | Уроки пройдены всеми: {}/{} | Средний %: {}",
            stats.completed_chapters,
            stats.total_chapters,
            stats.completed_lessons,
            stats.total_lessons,
            stats.lesson_avg_percentage
        );
        worksheet.merge_range(summary_row, 0, summary_row, (columns.len() - 1) as u16, &summary, &summary_fmt)?;

        worksheet.set_freeze_panes(3, 0)?;
        Ok(())
    }

    fn write_students(worksheet: &mut Worksheet, report: &SubjectReport) -> Result<()> {
        worksheet.set_name("Ученики")?;
        let columns = [
            ("№", 8.0),
            ("ФИО", 30.0),
            ("Класс", 10.0),
            ("СОЧ, %", 12.0),
            ("Разделы, %", 12.0),
            ("Разделы, балл", 14.0),
            ("Уроки, %", 12.0),
            ("Уроки, балл", 12.0),
        ];
        let title = format!("{}: успеваемость", report.title);
        Self::write_heading(worksheet, &title, &Self::subtitle(report), &columns)?;

        let data_start_row = 3;
        for (idx, student) in report.students.iter().enumerate() {
            let row = data_start_row + idx as u32;
            let base_fmt = Self::base_format(idx);
            let center_fmt = base_fmt.clone().set_align(FormatAlign::Center);
            worksheet.set_row_height(row, 22)?;

            worksheet.write_number_with_format(row, 0, (idx + 1) as f64, &center_fmt)?;
            worksheet.write_string_with_format(row, 1, &student.full_name, &base_fmt.clone().set_bold())?;
            worksheet.write_string_with_format(
                row,
                2,
                student.user_class.as_deref().unwrap_or("-"),
                &center_fmt,
            )?;

            let quarter_fmt = center_fmt
                .clone()
                .set_bold()
                .set_font_color(percentage_color(student.quarter_avg_percentage));
            worksheet.write_number_with_format(row, 3, num(student.quarter_avg_percentage), &quarter_fmt)?;
            worksheet.write_number_with_format(row, 4, num(student.chapter_avg_percentage), &center_fmt)?;
            worksheet.write_number_with_format(row, 5, num(student.chapter_avg_rating), &center_fmt)?;
            worksheet.write_number_with_format(row, 6, num(student.lesson_avg_percentage), &center_fmt)?;
            worksheet.write_number_with_format(row, 7, num(student.lesson_avg_rating), &center_fmt)?;
        }

        worksheet.set_freeze_panes(3, 0)?;
        worksheet.autofilter(
            2,
            0,
            (data_start_row + report.students.len() as u32).saturating_sub(1).max(2),
            (columns.len() - 1) as u16,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::teacher_dto::{AssessmentReport, ReportStatistics, ScoreBands, StudentReport};
    use uuid::Uuid;

    fn report() -> SubjectReport {
        SubjectReport {
            subject_id: Uuid::new_v4(),
            title: "Algebra 7".into(),
            selected_class: Some("7A".into()),
            selected_quarter: 2,
            available_classes: vec!["7A".into()],
            assessments: vec![AssessmentReport {
                lesson_id: Uuid::new_v4(),
                title: "Check 1".into(),
                lesson_type: "chapter".into(),
                students: 1,
                max_score: 10,
                bands: ScoreBands { low: 0, mid: 1, high: 0 },
            }],
            students: vec![StudentReport {
                user_id: Uuid::new_v4(),
                user_subject_id: Uuid::new_v4(),
                full_name: "Aru Serik".into(),
                user_class: Some("7A".into()),
                quarter_avg_percentage: Decimal::new(6250, 2),
                chapter_avg_percentage: Decimal::from(70),
                chapter_avg_rating: Decimal::from(7),
                lesson_avg_percentage: Decimal::from(80),
                lesson_avg_rating: Decimal::from(8),
            }],
            statistics: ReportStatistics::default(),
        }
    }

    #[test]
    fn report_workbook_is_a_zip_container() {
        let buffer = ExportService::generate_report_xlsx(&report()).unwrap();
        assert!(buffer.len() > 100);
        assert_eq!(&buffer[..2], b"PK");
    }

    #[test]
    fn empty_report_still_exports() {
        let mut empty = report();
        empty.assessments.clear();
        empty.students.clear();
        assert!(ExportService::generate_report_xlsx(&empty).is_ok());
    }

    #[test]
    fn filename_is_slugged() {
        let name = ExportService::report_filename(&report());
        assert!(name.starts_with("report_algebra_7_q2_"));
        assert!(name.ends_with(".xlsx"));
    }
}
